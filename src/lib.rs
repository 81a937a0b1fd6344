//! # ApexRun ML: running-analytics model lifecycle
//!
//! Builds, stores and serves three small running-analytics models:
//!
//! | Task          | Output                          | Features |
//! |---------------|---------------------------------|----------|
//! | `gait_form`   | form score 0-100 (regression)   | 8        |
//! | `injury_risk` | low / moderate / high (softmax) | 7        |
//! | `performance` | 5K time in seconds (regression) | 6        |
//!
//! A build synthesizes a seeded dataset per task, trains a dense network with
//! early stopping and learning-rate decay, exports per-feature normalization
//! params, converts the network into a quantized artifact (`none`, `float16`,
//! `dynamic` or `int8`) and publishes both files atomically. Stored artifacts
//! are listed, downloaded and run through a quantization-aware inference
//! path whose output is interpreted into domain terms.
//!
//! ## Pipeline
//!
//! ```text
//! synthesize ──▶ train ──▶ normalization ──▶ convert ──▶ publish
//!  (dataset)   (backend)    (mean/std)      (artifact)   (store)
//!                                                           │
//!                 interpret ◀── inference ◀──────── read ◀──┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Mutex;
//!
//! use apexrun_ml::backend::BackendCapability;
//! use apexrun_ml::config::Config;
//! use apexrun_ml::inference::InferenceEngine;
//! use apexrun_ml::pipeline::BuildPipeline;
//! use apexrun_ml::store::ArtifactStore;
//! use apexrun_ml::task::Task;
//! use apexrun_ml::tracking::RunStore;
//!
//! let config = Config::builder().models_dir("models").build()?;
//! let store = ArtifactStore::open(&config.models_dir)?;
//! let capability = BackendCapability::detect(config.backend);
//! let runs = Mutex::new(RunStore::new());
//!
//! let summary = BuildPipeline::new(&config, &store, capability.backend()?, &runs).build_all();
//! println!("built {} models, {:.1} KB", summary.models.len(), summary.total_kb());
//!
//! let engine = InferenceEngine::new(&store, &capability);
//! let features = [245.0, 8.5, 172.0, 1.15, 6.0, 5.0, 92.0, 5.4];
//! let output = engine.predict(Task::GaitForm, &features)?;
//! let view = apexrun_ml::interpret::interpret(Task::GaitForm, &output)?;
//! println!("{}", serde_json::to_string(&view)?);
//! # Ok::<(), apexrun_ml::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod artifact;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod interpret;
pub mod normalization;
pub mod pipeline;
pub mod quant;
pub mod rules;
pub mod server;
pub mod store;
pub mod task;
pub mod tracking;

pub use error::{Error, Result};
