//! Complete aircraft sizing model.
//!
//! Wires the atmosphere, wing skin friction, weights and constraint
//! analysis groups for one [`AircraftConfig`] under a single root. Every
//! subsystem promotes all of its variables; the only explicit connection
//! feeds `cruise_speed` to the flight-condition `speed` input.

use std::sync::Arc;

use log::debug;

use crate::config::AircraftConfig;
use crate::group::{Group, Promotes};
use crate::model::Model;
use crate::models::atmosphere::{atmosphere_group, AtmosphereModel};
use crate::models::gross_weight::sizing_gross_weight_group;
use crate::models::sizing_performance::sizing_performance_group;
use crate::models::skin_friction::{skin_friction_group, SkinFrictionPart};
use crate::models::IndepVarComp;
use crate::{ModelResult, Shape};

/// Mission and flight-condition inputs, SI.
#[derive(Debug, Clone, PartialEq)]
pub struct Mission {
    pub altitude: f64,
    pub cruise_speed: f64,
    pub range: f64,
    /// Cruise L/D, fixed here rather than derived from a drag build-up
    pub lift_to_drag_ratio: f64,
    pub payload_weight: f64,
    pub crew_weight: f64,
    /// Reference length for the wing Reynolds number
    pub characteristic_length: f64,
}

impl Default for Mission {
    fn default() -> Self {
        Mission {
            altitude: 10_000.0,
            cruise_speed: 230.0,
            range: 6.5e6,
            lift_to_drag_ratio: 15.0,
            payload_weight: 3.0e5,
            crew_weight: 2.0e4,
            characteristic_length: 4.0,
        }
    }
}

impl Mission {
    fn independent(&self, shape: &Shape) -> IndepVarComp {
        let mut comp = IndepVarComp::new(shape);
        comp.add_output("altitude", self.altitude)
            .add_output("cruise_speed", self.cruise_speed)
            .add_output("range", self.range)
            .add_output("lift_to_drag_ratio", self.lift_to_drag_ratio)
            .add_output("payload_weight", self.payload_weight)
            .add_output("crew_weight", self.crew_weight)
            .add_output("characteristic_length", self.characteristic_length);
        comp
    }
}

/// Insertion order of the independent analyses under the root group.
///
/// Only affects the order in which unrelated subsystems are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssemblyOrder {
    #[default]
    AtmosphereFirst,
    WeightsFirst,
}

/// Root group for `config` flying `mission`.
pub fn aircraft_group(shape: &Shape, config: &AircraftConfig, mission: &Mission, order: AssemblyOrder) -> ModelResult<Group> {
    config.validate()?;
    let atmosphere = atmosphere_group(shape, Arc::new(AtmosphereModel::new()?));
    let skin_friction = skin_friction_group(shape, config.regime, &SkinFrictionPart::default())?;
    let weights = sizing_gross_weight_group(shape, config)?;

    let mut aero = IndepVarComp::new(shape);
    aero.add_output("oswald_efficiency", config.oswald_efficiency)
        .add_output("aspect_ratio", config.aspect_ratio)
        .add_output("cd0", config.cd0);

    let mut root = Group::new();
    root.add_independent("mission_comp", mission.independent(shape), Promotes::All)
        .add_independent("aero_comp", aero, Promotes::All);
    match order {
        AssemblyOrder::AtmosphereFirst => {
            root.add_group("atmosphere", atmosphere, Promotes::All)
                .add_group("skin_friction", skin_friction, Promotes::All)
                .add_group("weights", weights, Promotes::All);
        }
        AssemblyOrder::WeightsFirst => {
            root.add_group("weights", weights, Promotes::All)
                .add_group("atmosphere", atmosphere, Promotes::All)
                .add_group("skin_friction", skin_friction, Promotes::All);
        }
    }
    root.add_group("performance", sizing_performance_group(shape, config)?, Promotes::All)
        .connect("cruise_speed", "speed");

    debug!(
        "assembled {} aircraft: {} energy, {} thrust, {} regime, {:?}",
        config.aircraft_type.as_str(),
        config.energy_source_type.as_str(),
        config.thrust_source_type.as_str(),
        config.regime.as_str(),
        order
    );
    Ok(root)
}

/// Assembles [`aircraft_group`] into a ready-to-run model.
pub fn aircraft_model(shape: &Shape, config: &AircraftConfig, mission: &Mission, order: AssemblyOrder) -> ModelResult<Model> {
    Model::setup(aircraft_group(shape, config, mission, order)?, shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AircraftType, EnergySource};
    use crate::models::gross_weight::GrossWeightResidual;
    use crate::solvers::ScalarResidual;
    use crate::ModelError;

    fn transport() -> AircraftConfig {
        AircraftConfig::new(AircraftType::Transport).with_energy_source(EnergySource::FuelBurning)
    }

    #[test]
    fn test_transport_runs_end_to_end() {
        let shape = Shape::scalar();
        let config = transport();
        let mut model = aircraft_model(&shape, &config, &Mission::default(), AssemblyOrder::default()).unwrap();
        model.run_model().unwrap();

        let w = model.get("gross_weight").unwrap()[[0]];
        let f = model.get("propellant_weight_fraction").unwrap()[[0]];
        let residual = GrossWeightResidual::new(&config.empty_weight_parameters(), 3.2e5, f);
        assert!(residual.value(w).abs() <= config.residual_tolerance);

        let mach = model.get("mach_number").unwrap()[[0]];
        assert!(mach > 0.7 && mach < 0.8, "mach {}", mach);
        let cf = model.get("skin_friction_coeff").unwrap()[[0]];
        assert!(cf > 1.0e-3 && cf < 5.0e-3, "cf {}", cf);
        assert!(model.get("wing_area").unwrap()[[0]] > 0.0);
    }

    #[test]
    fn test_speed_is_fed_from_cruise_speed() {
        let shape = Shape::new(&[2]);
        let mut model = aircraft_model(&shape, &transport(), &Mission::default(), AssemblyOrder::default()).unwrap();
        model.run_model().unwrap();
        let mach = model.get("mach_number").unwrap()[[0]];

        model.set("cruise_speed", 115.0).unwrap();
        model.run_model().unwrap();
        approx::assert_relative_eq!(model.get("mach_number").unwrap()[[1]], 0.5 * mach, max_relative = 1e-12);
        assert!(matches!(model.set("speed", 100.0), Err(ModelError::NotSettable { .. })));
    }

    #[test]
    fn test_order_changes_schedule_not_results() {
        let shape = Shape::scalar();
        let config = transport();
        let mut first = aircraft_model(&shape, &config, &Mission::default(), AssemblyOrder::AtmosphereFirst).unwrap();
        let mut second = aircraft_model(&shape, &config, &Mission::default(), AssemblyOrder::WeightsFirst).unwrap();
        assert_ne!(first.evaluation_order(), second.evaluation_order());

        first.run_model().unwrap();
        second.run_model().unwrap();
        for name in first.output_names() {
            assert_eq!(first.get(name).unwrap(), second.get(name).unwrap(), "{}", name);
        }
    }

    #[test]
    fn test_lift_to_drag_ratio_is_a_driver_input() {
        let mut model = aircraft_model(&Shape::scalar(), &transport(), &Mission::default(), AssemblyOrder::default()).unwrap();
        assert!(model.settable_names().contains(&"lift_to_drag_ratio"));

        model.set("lift_to_drag_ratio", 18.0).unwrap();
        model.run_model().unwrap();
        let expected = 1.0 - (-6.5e6f64 * 1.0e-4 / (230.0 * 18.0)).exp();
        approx::assert_relative_eq!(model.get("propellant_weight_fraction").unwrap()[[0]], expected, max_relative = 1e-12);
    }
}
