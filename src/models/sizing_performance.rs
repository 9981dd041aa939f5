//! Constraint analysis on wing loading and thrust-to-weight.
//!
//! Each field or maneuver requirement is turned into a limiting wing loading
//! (stall, takeoff, landing) or a required thrust-to-weight (climb, turn).
//! The group exposes signed constraint outputs, feasible when `<= 0`, and a
//! weighted objective trading thrust-to-weight against wing loading.

use std::f64::consts::PI;

use crate::config::{AircraftConfig, ThrustSource};
use crate::group::{Group, Promotes};
use crate::models::{IndepVarComp, LinearCombinationComp, LinearPowerCombinationComp, PowerCombinationComp};
use crate::units::{self, SEA_LEVEL_DENSITY};
use crate::{ModelResult, Shape};

/// Weight of the thrust-to-weight term in the objective; wing loading gets the rest.
const OBJECTIVE_THRUST_WEIGHT: f64 = 0.5;

/// Wing loadings limited by the field and stall requirements.
const WING_LOADING_LIMITS: [&str; 3] = ["stall", "takeoff", "landing"];

/// Thrust-to-weight requirements from maneuvers.
const MANEUVERS: [&str; 2] = ["climb", "turn"];

/// Landing distance per unit wing loading, Raymer's `80 W/S / (σ CL_max)`.
const LANDING_DISTANCE_FACTOR: f64 = 80.0;

fn config_inputs(shape: &Shape, config: &AircraftConfig) -> IndepVarComp {
    let mut comp = IndepVarComp::new(shape);
    comp.add_output("cl_max", config.cl_max)
        .add_output("cl_takeoff", config.cl_takeoff)
        .add_output("climb_gradient", config.climb_gradient)
        .add_output("turn_load_factor", config.turn_load_factor)
        .add_output("takeoff_parameter", config.takeoff_parameter)
        .add_output("takeoff_density", config.takeoff_density)
        .add_output("sealevel_density", SEA_LEVEL_DENSITY)
        .add_output("stall_speed", config.stall_speed)
        .add_output("climb_speed", config.climb_speed)
        .add_output("turn_speed", config.turn_speed)
        .add_output("landing_distance", config.landing_distance())
        .add_output("approach_distance", config.approach_distance())
        .add_output("wing_loading", config.wing_loading)
        .add_output("thrust_to_weight", config.thrust_to_weight)
        .add_output("ref_wing_loading", config.ref_wing_loading())
        .add_output("ref_thrust_to_weight", config.ref_thrust_to_weight);
    comp
}

/// `X_power_to_weight = X_thrust_to_weight · cruise_speed / propulsive_efficiency`.
fn power_to_weight(shape: &Shape, out_name: &str, thrust_to_weight: &str) -> PowerCombinationComp {
    PowerCombinationComp::new(shape, out_name)
        .with_power(thrust_to_weight, 1.0)
        .with_power("cruise_speed", 1.0)
        .with_power("propulsive_efficiency", -1.0)
}

/// Maneuver thrust-to-weight `T/W = G + n² q_i + q_0`, with induced term
/// `W/S / (0.5 π e AR ρ V²)` and parasite term `0.5 CD0 ρ V² / (W/S)`.
fn maneuver_thrust_to_weight(shape: &Shape, maneuver: &str, config_terms: &[(&str, f64)]) -> LinearPowerCombinationComp {
    let speed = format!("{}_speed", maneuver);
    let mut induced = vec![
        ("wing_loading", 1.0),
        ("oswald_efficiency", -1.0),
        ("aspect_ratio", -1.0),
        ("density", -1.0),
        (speed.as_str(), -2.0),
    ];
    induced.extend_from_slice(config_terms);

    let mut comp = LinearPowerCombinationComp::new(shape, &format!("{}_thrust_to_weight", maneuver));
    if maneuver == "climb" {
        comp = comp.with_term(1.0, &[("climb_gradient", 1.0)]);
    }
    comp.with_term(1.0 / (0.5 * PI), &induced)
        .with_term(0.5, &[("cd0", 1.0), ("density", 1.0), (speed.as_str(), 2.0), ("wing_loading", -1.0)])
}

/// Takeoff parameter scale for propeller aircraft: Pa per lbf/ft^2 times
/// hp per W times N per lbf, applied to a power loading in W/N.
fn propeller_takeoff_coefficient() -> f64 {
    units::pascals_from_psf(1.0) * units::horsepower_per_watt() * units::newtons_per_pound_force()
}

/// Sizing-performance analysis for a configuration.
///
/// Owns the constraint-analysis options of `config` as independent outputs,
/// including the design values `wing_loading` and `thrust_to_weight`.
/// Reads `density`, `gross_weight`, `cruise_speed`,
/// `propulsive_efficiency`, `oswald_efficiency`, `aspect_ratio` and `cd0`.
pub fn sizing_performance_group(shape: &Shape, config: &AircraftConfig) -> ModelResult<Group> {
    config.validate()?;
    let lbf_ft2_per_pa = units::psf_from_pascals(1.0);
    let pa_per_lbf_ft2 = units::pascals_from_psf(1.0);

    let mut group = Group::new();
    group
        .add_independent("inputs_comp", config_inputs(shape, config), Promotes::All)
        .add_component(
            "wing_loading_lbf_ft2_comp",
            PowerCombinationComp::new(shape, "wing_loading_lbf_ft2")
                .with_coeff(lbf_ft2_per_pa)
                .with_power("wing_loading", 1.0),
            Promotes::All,
        )
        .add_component(
            "ref_power_to_weight_comp",
            power_to_weight(shape, "ref_power_to_weight", "ref_thrust_to_weight"),
            Promotes::All,
        )
        .add_component("power_to_weight_comp", power_to_weight(shape, "power_to_weight", "thrust_to_weight"), Promotes::All)
        .add_component(
            "wing_area_comp",
            PowerCombinationComp::new(shape, "wing_area").with_power("gross_weight", 1.0).with_power("wing_loading", -1.0),
            Promotes::All,
        )
        .add_component(
            "max_thrust_comp",
            PowerCombinationComp::new(shape, "max_thrust")
                .with_power("gross_weight", 1.0)
                .with_power("thrust_to_weight", 1.0),
            Promotes::All,
        )
        .add_component(
            "stall_wing_loading_comp",
            PowerCombinationComp::new(shape, "stall_wing_loading")
                .with_coeff(0.5)
                .with_power("cl_max", 1.0)
                .with_power("density", 1.0)
                .with_power("stall_speed", 2.0),
            Promotes::All,
        )
        .add_component("climb_thrust_to_weight_comp", maneuver_thrust_to_weight(shape, "climb", &[]), Promotes::All)
        .add_component(
            "turn_thrust_to_weight_comp",
            maneuver_thrust_to_weight(shape, "turn", &[("turn_load_factor", 2.0)]),
            Promotes::All,
        );

    // Takeoff parameter is quoted in lbf/ft^2; propeller aircraft trade
    // thrust for power in hp per lbf.
    let takeoff = PowerCombinationComp::new(shape, "takeoff_wing_loading")
        .with_power("takeoff_parameter", 1.0)
        .with_power("takeoff_density", 1.0)
        .with_power("sealevel_density", -1.0)
        .with_power("cl_takeoff", 1.0);
    let takeoff = match config.thrust_source_type {
        ThrustSource::Jet => takeoff.with_coeff(pa_per_lbf_ft2).with_power("thrust_to_weight", 1.0),
        ThrustSource::Propeller => takeoff
            .with_coeff(propeller_takeoff_coefficient())
            .with_power("power_to_weight", 1.0),
    };
    group.add_component("takeoff_wing_loading_comp", takeoff, Promotes::All);

    let landing_powers = [("takeoff_density", 1.0), ("sealevel_density", -1.0), ("cl_max", 1.0)];
    let with_distance = |distance: &'static str| {
        let mut powers = vec![(distance, 1.0)];
        powers.extend_from_slice(&landing_powers);
        powers
    };
    group.add_component(
        "landing_wing_loading_comp",
        LinearPowerCombinationComp::new(shape, "landing_wing_loading")
            .with_term(1.0 / LANDING_DISTANCE_FACTOR, &with_distance("landing_distance"))
            .with_term(-1.0 / LANDING_DISTANCE_FACTOR, &with_distance("approach_distance")),
        Promotes::All,
    );

    for limit in WING_LOADING_LIMITS {
        let out_name = format!("{}_wing_loading_constraint", limit);
        group.add_component(
            &format!("{}_comp", out_name),
            LinearCombinationComp::new(shape, &out_name)
                .with_term("wing_loading", 1.0)
                .with_term(&format!("{}_wing_loading", limit), -1.0),
            Promotes::All,
        );
    }

    for maneuver in MANEUVERS {
        let required = format!("{}_thrust_to_weight", maneuver);
        let out_name = format!("{}_constraint", required);
        group.add_component(
            &format!("{}_comp", out_name),
            LinearCombinationComp::new(shape, &out_name).with_term("thrust_to_weight", -1.0).with_term(&required, 1.0),
            Promotes::All,
        );
        let power = format!("{}_power_to_weight", maneuver);
        group.add_component(&format!("{}_comp", power), power_to_weight(shape, &power, &required), Promotes::All);
    }

    group.add_component(
        "sizing_performance_objective_comp",
        LinearPowerCombinationComp::new(shape, "sizing_performance_objective")
            .with_term(OBJECTIVE_THRUST_WEIGHT, &[("thrust_to_weight", 1.0), ("ref_thrust_to_weight", -1.0)])
            .with_term(-(1.0 - OBJECTIVE_THRUST_WEIGHT), &[("wing_loading", 1.0), ("ref_wing_loading", -1.0)]),
        Promotes::All,
    );
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AircraftType;
    use crate::Model;
    use approx::assert_relative_eq;

    const DENSITY: f64 = 1.1;
    const CRUISE_SPEED: f64 = 120.0;

    fn model(shape: &Shape, config: &AircraftConfig) -> Model {
        let mut external = IndepVarComp::new(shape);
        external
            .add_output("density", DENSITY)
            .add_output("gross_weight", 5.0e4)
            .add_output("cruise_speed", CRUISE_SPEED)
            .add_output("propulsive_efficiency", 0.8)
            .add_output("oswald_efficiency", config.oswald_efficiency)
            .add_output("aspect_ratio", config.aspect_ratio)
            .add_output("cd0", config.cd0);

        let mut root = Group::new();
        root.add_independent("flight_comp", external, Promotes::All)
            .add_group("performance", sizing_performance_group(shape, config).unwrap(), Promotes::All);
        let mut model = Model::setup(root, shape).unwrap();
        model.run_model().unwrap();
        model
    }

    fn value(model: &Model, name: &str) -> f64 {
        model.get(name).unwrap()[[0]]
    }

    #[test]
    fn test_wing_loading_limits() {
        let config = AircraftConfig::new(AircraftType::GaTwin);
        let model = model(&Shape::scalar(), &config);

        let stall = 0.5 * config.cl_max * DENSITY * config.stall_speed.powi(2);
        assert_relative_eq!(value(&model, "stall_wing_loading"), stall, max_relative = 1e-12);
        assert_relative_eq!(value(&model, "stall_wing_loading_constraint"), config.wing_loading - stall, max_relative = 1e-12);

        let sigma = config.takeoff_density / SEA_LEVEL_DENSITY;
        let field = config.landing_distance() - config.approach_distance();
        assert_relative_eq!(value(&model, "landing_wing_loading"), field * sigma * config.cl_max / 80.0, max_relative = 1e-12);

        let jet_takeoff = config.takeoff_parameter
            * sigma
            * config.cl_takeoff
            * config.thrust_to_weight
            * units::pascals_from_psf(1.0);
        assert_relative_eq!(value(&model, "takeoff_wing_loading"), jet_takeoff, max_relative = 1e-12);

        assert_relative_eq!(value(&model, "wing_area"), 5.0e4 / config.wing_loading, max_relative = 1e-12);
        assert_relative_eq!(value(&model, "max_thrust"), 5.0e4 * config.thrust_to_weight, max_relative = 1e-12);
    }

    #[test]
    fn test_propeller_takeoff_uses_power_loading() {
        let config = AircraftConfig::new(AircraftType::GaSingle).with_thrust_source(ThrustSource::Propeller);
        let model = model(&Shape::scalar(), &config);

        let power_to_weight = config.thrust_to_weight * CRUISE_SPEED / 0.8;
        assert_relative_eq!(value(&model, "power_to_weight"), power_to_weight, max_relative = 1e-12);
        let coeff = units::pascals_from_psf(1.0) * units::horsepower_per_watt() * units::newtons_per_pound_force();
        assert_relative_eq!(coeff, propeller_takeoff_coefficient(), max_relative = 1e-14);
        assert_relative_eq!(coeff, 47.880258980 * 4.4482216152605 / 745.69987158227, max_relative = 1e-10);
        let expected =
            coeff * config.takeoff_parameter * config.takeoff_density / SEA_LEVEL_DENSITY * config.cl_takeoff * power_to_weight;
        assert_relative_eq!(value(&model, "takeoff_wing_loading"), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_maneuver_requirements() {
        let config = AircraftConfig::new(AircraftType::Transport);
        let model = model(&Shape::new(&[2]), &config);

        let ws = config.wing_loading;
        let induced = |v: f64| ws / (0.5 * PI * config.oswald_efficiency * config.aspect_ratio * DENSITY * v * v);
        let parasite = |v: f64| 0.5 * config.cd0 * DENSITY * v * v / ws;

        let climb = config.climb_gradient + induced(config.climb_speed) + parasite(config.climb_speed);
        let turn = config.turn_load_factor.powi(2) * induced(config.turn_speed) + parasite(config.turn_speed);
        assert_relative_eq!(model.get("climb_thrust_to_weight").unwrap()[[1]], climb, max_relative = 1e-12);
        assert_relative_eq!(value(&model, "turn_thrust_to_weight"), turn, max_relative = 1e-12);
        assert_relative_eq!(
            value(&model, "climb_thrust_to_weight_constraint"),
            climb - config.thrust_to_weight,
            max_relative = 1e-12
        );
        assert_relative_eq!(value(&model, "turn_power_to_weight"), turn * CRUISE_SPEED / 0.8, max_relative = 1e-12);
    }

    #[test]
    fn test_objective_and_its_gradient() {
        let config = AircraftConfig::new(AircraftType::Transport);
        let model = model(&Shape::scalar(), &config);
        let ref_ws = config.ref_wing_loading();

        let expected =
            0.5 * config.thrust_to_weight / config.ref_thrust_to_weight - 0.5 * config.wing_loading / ref_ws;
        assert_relative_eq!(value(&model, "sizing_performance_objective"), expected, max_relative = 1e-12);

        let totals = model
            .compute_totals(&["sizing_performance_objective", "climb_thrust_to_weight"], &["wing_loading", "thrust_to_weight"])
            .unwrap();
        assert_relative_eq!(totals.get("sizing_performance_objective", "wing_loading").unwrap()[[0]], -0.5 / ref_ws);
        assert_relative_eq!(
            totals.get("sizing_performance_objective", "thrust_to_weight").unwrap()[[0]],
            0.5 / config.ref_thrust_to_weight
        );

        let v = config.climb_speed;
        let ws = config.wing_loading;
        let d_climb = 1.0 / (0.5 * PI * config.oswald_efficiency * config.aspect_ratio * DENSITY * v * v)
            - 0.5 * config.cd0 * DENSITY * v * v / (ws * ws);
        assert_relative_eq!(totals.get("climb_thrust_to_weight", "wing_loading").unwrap()[[0]], d_climb, max_relative = 1e-10);
        assert_eq!(totals.get("climb_thrust_to_weight", "thrust_to_weight").unwrap()[[0]], 0.0);
    }

    #[test]
    fn test_wing_loading_in_imperial_units() {
        let config = AircraftConfig::new(AircraftType::GaSingle);
        let model = model(&Shape::scalar(), &config);
        let lbf_ft2 = units::psf_from_pascals(config.wing_loading);
        assert_relative_eq!(value(&model, "wing_loading_lbf_ft2"), lbf_ft2, max_relative = 1e-12);
    }
}
