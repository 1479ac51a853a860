//! Intent classification and dispatch

pub mod classifier;
pub mod dispatcher;

pub use classifier::{Classifier, HttpClassifier, IntentResult};
pub use dispatcher::{DispatchOutcome, IntentDispatcher, Screen};
