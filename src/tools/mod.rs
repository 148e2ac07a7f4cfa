pub mod calculator;
pub mod contract;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod web_lookup;

pub use calculator::CalculatorTool;
pub use contract::{FieldSpec, FieldType, InputContract, Tier};
pub use executor::{AttemptOutcome, Executor};
pub use registry::{Capability, CapabilityRegistry, Tool};
pub use schema::{plan_schema_json, tool_call_schema_json};
pub use web_lookup::WebLookupTool;
