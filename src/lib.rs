//! # qgcn
//!
//! Graph collaborative filtering with two embedding branches: one diffused
//! through the symmetrically normalised user–item adjacency, one through a
//! dense operator built from the adjacency's squared eigenvectors.
//!
//! ```ignore
//! use qgcn::builder::QgcnBuilder;
//! use qgcn::dataset::InteractionSet;
//! use qgcn::trainer::Trainer;
//!
//! let interactions = InteractionSet::new(3, 4, vec![(0, 0), (0, 1), (1, 2), (2, 3)])?;
//! let mut model = QgcnBuilder::new()
//!     .with_embedding_size(16)
//!     .with_layers(2, vec![1.0, 1.0, 1.0])
//!     .build(&interactions)?;
//!
//! Trainer::for_model(&model).fit(&mut model, &interactions)?;
//! let top = model.recommend_top_k(0, 2, Some(&interactions))?;
//! println!("{}", model.calculate_diversity());
//! ```

pub mod builder;
pub mod dataset;
pub mod diversity;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod loss;
pub mod model;
pub mod operators;
pub mod optim;
pub mod params;
pub mod scoring;
pub mod spectral;
pub mod trainer;

pub use builder::QgcnBuilder;
pub use error::{QgcnError, QgcnResult};
pub use model::Qgcn;

#[cfg(test)]
mod tests;
