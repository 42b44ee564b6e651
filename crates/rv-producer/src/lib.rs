//! rv-producer
//!
//! Turns raw provider records into published snapshot / module-state pairs:
//! module DAG ordering, record validation and the drop threshold, placeholder
//! pairs for failed fetches, the two-phase publish, and the batch run.

mod dag;
mod pipeline;
mod produce;
mod publish;

pub use dag::{DagError, ModuleDag};
pub use pipeline::{produce_from_payload, run_pipeline, ModuleOutcome, ModuleStatus, RunReport};
pub use produce::{evaluate_drop, placeholder, produce, DropCheck, ProduceContext, Produced};
pub use publish::{publish, PublishArgs, PublishError, PublishOutcome};
