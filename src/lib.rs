//! Streaming random cut forest core.
//!
//! A random cut forest is an ensemble of randomized binary space-partitioning
//! trees built over time-decayed reservoir samples of a stream of
//! multidimensional points. The ensemble supports continuous updates in
//! bounded memory and answers anomaly scores, directional attributions,
//! density estimates, imputation of missing coordinates, near-neighbor
//! lookups and simple forecasts through visitor-driven tree traversals.
//!
//! ```
//! use randcut::ForestBuilder;
//!
//! let mut forest = ForestBuilder::new(2)
//!     .number_of_trees(30)
//!     .sample_size(128)
//!     .random_seed(42)
//!     .build_double()
//!     .unwrap();
//!
//! for i in 0..1000 {
//!     let angle = i as f64 / 50.0;
//!     forest.update(&[angle.cos(), angle.sin()]).unwrap();
//! }
//!
//! // points far from the unit circle score high
//! assert!(forest.anomaly_score(&[8.0, 8.0]).unwrap() > 1.0);
//! ```
//!
//! ### References
//!
//! Sudipto Guha, Nina Mishra, Gourav Roy, and Okke Schrijvers. *"Robust
//! random cut forest based anomaly detection on streams."* International
//! Conference on Machine Learning, pp. 2712-2721. PMLR, 2016.

mod accumulator;
mod boundingbox;
mod component;
mod config;
mod cut;
pub mod datagen;
mod density;
mod divector;
mod errors;
mod forest;
mod indexmanager;
mod pointstore;
mod sampler;
mod tree;
mod types;
pub mod visitor;

pub use accumulator::{ConvergingAccumulator, OneSidedAccumulator};
pub use boundingbox::BoundingBox;
pub use config::{ForestBuilder, ForestOptions, Precision};
pub use cut::Cut;
pub use density::{DensityOutput, InterpolationMeasure};
pub use divector::DiVector;
pub use errors::{ForestError, Result};
pub use forest::{AnyForest, Neighbor, RandomCutForest};
pub use indexmanager::IndexManager;
pub use pointstore::PointStore;
pub use sampler::{Evicted, Offer, SampledEntry, TimeDecaySampler};
pub use types::{l1_distance, l2_distance, CoordFloat};
