//! Components and groups for aircraft sizing.
//!
//! - **independent**: driver-settable inputs ([`IndepVarComp`])
//! - **arithmetic**: linear, power and linear-power combinations and a KS
//!   soft minimum, the building blocks of most sizing relations
//! - **atmosphere**: standard atmosphere with a blended tropopause
//! - **skin_friction**: laminar/turbulent flat-plate skin friction
//! - **gross_weight**: Breguet and battery propellant fractions, empty-weight
//!   regression and the implicit gross-weight solve
//! - **sizing_performance**: wing-loading and thrust-to-weight constraints
//! - **aircraft**: all of the above assembled for one configuration
//!
//! ## Example
//!
//! ```
//! use aerosize::models::aircraft::{aircraft_model, AssemblyOrder, Mission};
//! use aerosize::{AircraftConfig, AircraftType, EnergySource, Shape};
//!
//! let config = AircraftConfig::new(AircraftType::Transport).with_energy_source(EnergySource::FuelBurning);
//! let mut model = aircraft_model(&Shape::scalar(), &config, &Mission::default(), AssemblyOrder::default()).unwrap();
//! model.run_model().unwrap();
//!
//! let totals = model.compute_totals(&["gross_weight"], &["payload_weight"]).unwrap();
//! assert!(totals.get("gross_weight", "payload_weight").unwrap()[[0]] > 1.0);
//! ```

pub mod aircraft;
pub mod arithmetic;
pub mod atmosphere;
pub mod gross_weight;
pub mod independent;
pub mod sizing_performance;
pub mod skin_friction;

pub use aircraft::{aircraft_group, aircraft_model, AssemblyOrder, Mission};
pub use arithmetic::{ElementwiseMinComp, LinearCombinationComp, LinearPowerCombinationComp, PowerCombinationComp};
pub use atmosphere::{atmosphere_group, AtmosphereModel};
pub use gross_weight::{
    sizing_gross_weight_group, BreguetPropellantWeightFractionComp, BreguetRangeComp, EmptyWeightFractionComp, GrossWeightComp,
    GrossWeightResidual,
};
pub use independent::IndepVarComp;
pub use sizing_performance::sizing_performance_group;
pub use skin_friction::{skin_friction_group, SkinFrictionCoeffComp, SkinFrictionModel, SkinFrictionPart};
