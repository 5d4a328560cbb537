use stagebody::utils::math::point_mass_inertia;
use stagebody::{
    DMat3, DVec3, JointKind, MassProperties, MultibodySystem, SpatialVec, Stage, State, Transform,
    GROUND,
};
use std::f64::consts::FRAC_PI_2;

const LENGTH: f64 = 5.0;
const MASS: f64 = 3.0;
const STEP: f64 = 1e-4;
const DURATION: f64 = 10.0;

fn main() -> stagebody::Result<()> {
    let gravity = DVec3::new(0.0, -9.8, 0.0);
    let com = DVec3::new(LENGTH / 2.0, 0.0, 0.0);
    let pinned_end = DVec3::new(-LENGTH / 2.0, 0.0, 0.0);

    let mut system = MultibodySystem::new();
    let rod = system.add_rigid_body(
        MassProperties::new(
            MASS,
            com,
            point_mass_inertia(com, MASS) + DMat3::IDENTITY * 1e-6,
        ),
        Transform::from_translation(pinned_end),
        GROUND,
        Transform::IDENTITY,
        JointKind::Free,
    )?;
    system.add_coincident_stations_constraint(GROUND, DVec3::ZERO, rod, pinned_end)?;

    let mut state = State::new();
    system.realize(&mut state, Stage::Built)?;
    system.set_use_euler_angles(&mut state, true)?;
    system.realize(&mut state, Stage::Modeled)?;

    // Start slightly off vertical and away from the pin.
    system.set_joint_q(&mut state, rod, 2, -FRAC_PI_2 + 0.1)?;
    system.set_joint_q(&mut state, rod, 3, 0.05)?;
    system.realize(&mut state, Stage::Configured)?;
    println!("rod frame before assembly:\n{}", system.body_configuration(&state, rod)?);

    system.enforce_configuration_constraints(&mut state)?;
    system.realize(&mut state, Stage::Configured)?;
    println!("rod frame after assembly:\n{}", system.body_configuration(&state, rod)?);

    system.set_joint_u(&mut state, rod, 2, 0.02)?;
    system.enforce_motion_constraints(&mut state)?;
    system.realize(&mut state, Stage::Moving)?;

    let mut gradient = vec![SpatialVec::ZERO; system.n_bodies()];
    gradient[rod] = SpatialVec::new(DVec3::new(0.0, 0.0, 1.0), DVec3::ZERO);
    println!(
        "internal gradient: {:?}",
        system.calc_internal_gradient_from_spatial(&state, &gradient)?
    );
    println!("rod velocity: {}", system.body_velocity(&state, rod)?);
    println!("q = {:?}", system.q(&state)?);
    println!("u = {:?}", system.u(&state)?);
    println!("qdot = {:?}", system.qdot(&state)?);

    system.clear_applied_forces(&mut state)?;
    system.apply_gravity(&mut state, gravity)?;
    println!("applied body forces: {:?}", system.applied_body_forces(&state)?);
    println!("applied joint forces: {:?}", system.applied_joint_forces(&state)?);
    system.realize(&mut state, Stage::Moving)?;
    let body_forces = system.applied_body_forces(&state)?.to_vec();
    println!(
        "equivalent joint forces: {:?}",
        system.calc_tree_equivalent_joint_forces(&state, &body_forces)?
    );

    system.realize(&mut state, Stage::Reacting)?;
    println!("rod acceleration: {}", system.body_acceleration(&state, rod)?);
    println!("multipliers: {:?}", system.multipliers(&state)?);
    println!("{state}");

    let steps = (DURATION / STEP).round() as usize;
    let report_every = steps / 20;
    for n in 0..=steps {
        system.enforce_configuration_constraints(&mut state)?;
        system.enforce_motion_constraints(&mut state)?;
        system.realize(&mut state, Stage::Configured)?;
        system.clear_applied_forces(&mut state)?;
        system.apply_gravity(&mut state, gravity)?;
        system.realize(&mut state, Stage::Reacting)?;

        if n % report_every == 0 {
            let joint_forces = system.applied_joint_forces(&state)?.to_vec();
            let body_forces = system.applied_body_forces(&state)?.to_vec();
            let tree_udot = system.calc_tree_udot(&state, &joint_forces, &body_forces)?;
            let x = system
                .body_configuration(&state, rod)?
                .transform_point(com)
                .x;
            println!(
                "t = {:6.3}  x = {:+.6}  udot = {:?}  tree udot = {:?}",
                n as f64 * STEP,
                x,
                system.udot(&state)?,
                tree_udot
            );
        }

        let qdot = system.qdot(&state)?.to_vec();
        let udot = system.udot(&state)?.to_vec();
        for (q, rate) in system.upd_q(&mut state)?.iter_mut().zip(&qdot) {
            *q += STEP * rate;
        }
        for (u, rate) in system.upd_u(&mut state)?.iter_mut().zip(&udot) {
            *u += STEP * rate;
        }
    }
    Ok(())
}
