use approx::assert_abs_diff_eq;
use stagebody::utils::math::point_mass_inertia;
use stagebody::{
    DMat3, DVec3, JointKind, MassProperties, MultibodySystem, SimError, SpatialVec, Stage, State,
    Transform, GROUND,
};

const G: f64 = 9.8;

fn free_body(mass_properties: MassProperties) -> (MultibodySystem, usize) {
    let mut system = MultibodySystem::new();
    let body = system
        .add_rigid_body(
            mass_properties,
            Transform::IDENTITY,
            GROUND,
            Transform::IDENTITY,
            JointKind::Free,
        )
        .unwrap();
    (system, body)
}

/// Three links mixing pin, ball and sliding joints.
fn mixed_chain() -> MultibodySystem {
    let mut system = MultibodySystem::new();
    let link = MassProperties::from_central_inertia(
        1.5,
        DVec3::new(0.5, 0.0, 0.0),
        DMat3::from_diagonal(DVec3::new(0.02, 0.1, 0.1)),
    );
    let tip = Transform::from_translation(DVec3::new(1.0, 0.0, 0.0));
    let a = system
        .add_rigid_body(link, Transform::IDENTITY, GROUND, Transform::IDENTITY, JointKind::Pin)
        .unwrap();
    let b = system
        .add_rigid_body(link, Transform::IDENTITY, a, tip, JointKind::Ball)
        .unwrap();
    system
        .add_rigid_body(link, Transform::IDENTITY, b, tip, JointKind::Sliding)
        .unwrap();
    system
}

fn set_mixed_chain_motion(system: &MultibodySystem, state: &mut State) {
    let half = (0.5_f64).sqrt();
    system
        .upd_q(state)
        .unwrap()
        .copy_from_slice(&[0.3, half, 0.0, half * 0.6, half * 0.8, 0.25]);
    system
        .upd_u(state)
        .unwrap()
        .copy_from_slice(&[0.7, -0.4, 1.1, 0.3, -0.9]);
}

#[test]
fn test_free_body_falls_with_gravity() {
    let props = MassProperties::from_central_inertia(
        2.0,
        DVec3::new(0.5, 0.0, 0.0),
        DMat3::from_diagonal(DVec3::new(0.1, 0.2, 0.3)),
    );
    let (system, body) = free_body(props);
    let mut state = State::new();
    system.realize(&mut state, Stage::Configured).unwrap();
    system
        .apply_gravity(&mut state, DVec3::new(0.0, -G, 0.0))
        .unwrap();
    system.realize(&mut state, Stage::Reacting).unwrap();

    let udot = system.udot(&state).unwrap();
    let expected = [0.0, 0.0, 0.0, 0.0, -G, 0.0];
    for (actual, expected) in udot.iter().zip(expected) {
        assert_abs_diff_eq!(*actual, expected, epsilon = 1e-10);
    }
    let acceleration = system.body_acceleration(&state, body).unwrap();
    assert_abs_diff_eq!(acceleration.ang.length(), 0.0, epsilon = 1e-10);
    assert_abs_diff_eq!(acceleration.lin.y, -G, epsilon = 1e-10);
}

#[test]
fn test_tree_udot_matches_force_over_mass() {
    let props = MassProperties::from_central_inertia(
        4.0,
        DVec3::new(0.0, 0.2, -0.1),
        DMat3::from_diagonal(DVec3::new(0.5, 0.4, 0.3)),
    );
    let (system, _) = free_body(props);
    let mut state = State::new();
    system.realize(&mut state, Stage::Moving).unwrap();
    system
        .apply_gravity(&mut state, DVec3::new(1.0, -G, 2.0))
        .unwrap();

    let body_forces = system.applied_body_forces(&state).unwrap().to_vec();
    let udot = system
        .calc_tree_udot(&state, &[0.0; 6], &body_forces)
        .unwrap();
    assert_abs_diff_eq!(udot[3], 1.0, epsilon = 1e-10);
    assert_abs_diff_eq!(udot[4], -G, epsilon = 1e-10);
    assert_abs_diff_eq!(udot[5], 2.0, epsilon = 1e-10);
}

#[test]
fn test_torque_free_spin_follows_euler_equations() {
    let inertia = DMat3::from_diagonal(DVec3::new(1.0, 2.0, 3.0));
    let props = MassProperties::new(1.0, DVec3::ZERO, inertia);
    let (system, _) = free_body(props);
    let mut state = State::new();
    system.realize(&mut state, Stage::Modeled).unwrap();
    system.upd_u(&mut state).unwrap()[..3].copy_from_slice(&[1.0, 1.0, 0.0]);
    system.realize(&mut state, Stage::Reacting).unwrap();

    // I w' = -w x (I w) with w = (1, 1, 0) gives w' = (0, 0, -1/3).
    let udot = system.udot(&state).unwrap();
    assert_abs_diff_eq!(udot[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(udot[1], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(udot[2], -1.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(udot[3..].iter().map(|v| v.abs()).sum::<f64>(), 0.0, epsilon = 1e-12);
}

#[test]
fn test_joint_force_on_sliding_body() {
    let mut system = MultibodySystem::new();
    let body = system
        .add_rigid_body(
            MassProperties::new(2.0, DVec3::ZERO, DMat3::IDENTITY),
            Transform::IDENTITY,
            GROUND,
            Transform::IDENTITY,
            JointKind::Sliding,
        )
        .unwrap();
    let mut state = State::new();
    system.realize(&mut state, Stage::Modeled).unwrap();
    system.apply_joint_force(&mut state, body, 0, 4.0).unwrap();
    system.apply_joint_force(&mut state, body, 0, 2.0).unwrap();
    assert_eq!(system.applied_joint_forces(&state).unwrap(), &[6.0]);
    assert!(matches!(
        system.apply_joint_force(&mut state, body, 1, 1.0),
        Err(SimError::InvalidArgument(_))
    ));

    system.realize(&mut state, Stage::Reacting).unwrap();
    assert_abs_diff_eq!(system.udot(&state).unwrap()[0], 3.0, epsilon = 1e-12);
}

#[test]
fn test_point_force_adds_moment_about_origin() {
    let (system, body) = free_body(MassProperties::default());
    let mut state = State::new();
    system.realize(&mut state, Stage::Configured).unwrap();
    let station = DVec3::new(1.0, 0.0, 0.0);
    let force = DVec3::new(0.0, 2.0, 0.0);
    system
        .apply_point_force(&mut state, body, station, force)
        .unwrap();
    system
        .apply_point_force(&mut state, body, station, force)
        .unwrap();

    let applied = system.applied_body_forces(&state).unwrap()[body];
    assert_eq!(applied.ang, DVec3::new(0.0, 0.0, 4.0));
    assert_eq!(applied.lin, DVec3::new(0.0, 4.0, 0.0));

    system.clear_applied_forces(&mut state).unwrap();
    let once = system.applied_body_forces(&state).unwrap().to_vec();
    system.clear_applied_forces(&mut state).unwrap();
    assert_eq!(system.applied_body_forces(&state).unwrap(), once.as_slice());
    assert!(once.iter().all(|f| *f == SpatialVec::ZERO));
}

#[test]
fn test_body_force_matches_point_force() {
    let (system, body) = free_body(MassProperties::default());
    let mut by_point = State::new();
    system.realize(&mut by_point, Stage::Configured).unwrap();
    system
        .apply_point_force(&mut by_point, body, DVec3::new(0.0, 0.0, 2.0), DVec3::X)
        .unwrap();

    let mut by_body = State::new();
    system.realize(&mut by_body, Stage::Modeled).unwrap();
    let spatial = SpatialVec::new(DVec3::new(0.0, 2.0, 0.0), DVec3::X);
    system.apply_body_force(&mut by_body, body, spatial).unwrap();
    assert!(matches!(
        system.apply_body_force(&mut by_body, 5, spatial),
        Err(SimError::InvalidArgument(_))
    ));

    assert_eq!(
        system.applied_body_forces(&by_point).unwrap(),
        system.applied_body_forces(&by_body).unwrap()
    );
    for state in [&mut by_point, &mut by_body] {
        system.realize(state, Stage::Reacting).unwrap();
    }
    assert_eq!(system.udot(&by_point).unwrap(), system.udot(&by_body).unwrap());
}

#[test]
fn test_pin_pendulum_through_system() {
    let (length, mass) = (2.0, 3.0);
    let com = DVec3::new(length, 0.0, 0.0);
    let mut system = MultibodySystem::new();
    let body = system
        .add_rigid_body(
            MassProperties::new(mass, com, point_mass_inertia(com, mass)),
            Transform::IDENTITY,
            GROUND,
            Transform::IDENTITY,
            JointKind::Pin,
        )
        .unwrap();
    let mut state = State::new();
    system.realize(&mut state, Stage::Modeled).unwrap();
    let theta = -1.0_f64;
    system.set_joint_q(&mut state, body, 0, theta).unwrap();
    system.realize(&mut state, Stage::Configured).unwrap();
    system
        .apply_gravity(&mut state, DVec3::new(0.0, -G, 0.0))
        .unwrap();
    system.realize(&mut state, Stage::Reacting).unwrap();

    let expected = -G / length * theta.cos();
    assert_abs_diff_eq!(system.udot(&state).unwrap()[0], expected, epsilon = 1e-12);
}

#[test]
fn test_equivalent_joint_forces_do_virtual_work() {
    let system = mixed_chain();
    let mut state = State::new();
    system.realize(&mut state, Stage::Modeled).unwrap();
    set_mixed_chain_motion(&system, &mut state);
    system.realize(&mut state, Stage::Moving).unwrap();

    let forces = vec![
        SpatialVec::ZERO,
        SpatialVec::new(DVec3::new(0.1, -0.3, 0.7), DVec3::new(1.0, 2.0, -0.5)),
        SpatialVec::new(DVec3::new(-0.4, 0.2, 0.0), DVec3::new(0.0, -1.5, 0.8)),
        SpatialVec::new(DVec3::new(0.3, 0.3, -0.2), DVec3::new(2.5, 0.1, 0.0)),
    ];
    let tau = system
        .calc_tree_equivalent_joint_forces(&state, &forces)
        .unwrap();

    let u = system.u(&state).unwrap();
    let generalized_power: f64 = tau.iter().zip(u).map(|(t, u)| t * u).sum();
    let spatial_power: f64 = forces
        .iter()
        .enumerate()
        .map(|(k, f)| f.dot(&system.body_velocity(&state, k).unwrap()))
        .sum();
    assert_abs_diff_eq!(generalized_power, spatial_power, epsilon = 1e-10);

    let gradient = system
        .calc_internal_gradient_from_spatial(&state, &forces)
        .unwrap();
    assert_eq!(gradient, tau);
}

#[test]
fn test_operators_require_moving() {
    let system = mixed_chain();
    let mut state = State::new();
    system.realize(&mut state, Stage::Configured).unwrap();
    let forces = vec![SpatialVec::ZERO; system.n_bodies()];
    assert!(matches!(
        system.calc_tree_equivalent_joint_forces(&state, &forces),
        Err(SimError::NotRealized { .. })
    ));
    assert!(matches!(
        system.calc_tree_udot(&state, &[0.0; 5], &forces),
        Err(SimError::NotRealized { .. })
    ));

    system.realize(&mut state, Stage::Moving).unwrap();
    assert!(matches!(
        system.calc_tree_udot(&state, &[0.0; 4], &forces),
        Err(SimError::InvalidArgument(_))
    ));
    assert!(matches!(
        system.calc_tree_equivalent_joint_forces(&state, &forces[..2]),
        Err(SimError::InvalidArgument(_))
    ));
}

#[test]
fn test_tree_udot_agrees_with_realized_udot() {
    let mut system = mixed_chain();
    system.set_parallel_enabled(false);
    let mut state = State::new();
    system.realize(&mut state, Stage::Modeled).unwrap();
    set_mixed_chain_motion(&system, &mut state);
    system.realize(&mut state, Stage::Configured).unwrap();
    system
        .apply_gravity(&mut state, DVec3::new(0.0, -G, 0.0))
        .unwrap();
    system.apply_joint_force(&mut state, 3, 0, 0.5).unwrap();

    system.realize(&mut state, Stage::Moving).unwrap();
    let before_dynamics = system
        .calc_tree_udot(
            &state,
            system.applied_joint_forces(&state).unwrap(),
            system.applied_body_forces(&state).unwrap(),
        )
        .unwrap();

    system.realize(&mut state, Stage::Reacting).unwrap();
    let realized = system.udot(&state).unwrap();
    let after_dynamics = system
        .calc_tree_udot(
            &state,
            system.applied_joint_forces(&state).unwrap(),
            system.applied_body_forces(&state).unwrap(),
        )
        .unwrap();
    for ((a, b), c) in realized.iter().zip(&before_dynamics).zip(&after_dynamics) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        assert_abs_diff_eq!(*a, *c, epsilon = 1e-12);
    }
}

#[test]
fn test_parallel_passes_match_sequential() {
    let mut sequential = mixed_chain();
    sequential.set_parallel_enabled(false);
    let mut parallel = mixed_chain();
    parallel.set_parallel_enabled(true);

    let mut results = Vec::new();
    for system in [&sequential, &parallel] {
        let mut state = State::new();
        system.realize(&mut state, Stage::Modeled).unwrap();
        set_mixed_chain_motion(system, &mut state);
        system.realize(&mut state, Stage::Configured).unwrap();
        system
            .apply_gravity(&mut state, DVec3::new(0.0, -G, 0.0))
            .unwrap();
        system.realize(&mut state, Stage::Reacting).unwrap();
        results.push(system.udot(&state).unwrap().to_vec());
    }
    assert_eq!(results[0], results[1]);
}

#[test]
fn test_massless_body_reports_singular_mass_matrix() {
    let mut system = MultibodySystem::new();
    system
        .add_rigid_body(
            MassProperties::new(0.0, DVec3::ZERO, DMat3::ZERO),
            Transform::IDENTITY,
            GROUND,
            Transform::IDENTITY,
            JointKind::Sliding,
        )
        .unwrap();
    let mut state = State::new();
    let err = system.realize(&mut state, Stage::Reacting).unwrap_err();
    assert_eq!(err, SimError::SingularMassMatrix { body: 1 });
    assert_eq!(state.stage(), Stage::Moving);
}
