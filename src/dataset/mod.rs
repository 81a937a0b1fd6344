//! Labeled feature matrices for the three tasks
//!
//! A [`Dataset`] is a row-major `f32` matrix whose column order is the task's
//! feature contract, paired with regression targets or class indices.
//! Datasets are transient: generated, consumed by the trainer, discarded.
//! For offline inspection they convert to an Arrow `RecordBatch` and can be
//! snapshotted to Parquet.

mod synth;

pub use synth::{risk_class, synthesize, synthesize_with_seed};

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float32Array, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::task::Task;
use crate::{Error, Result};

/// Name of the label column in Arrow/Parquet form.
pub const LABEL_COLUMN: &str = "label";

/// Targets paired with a feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    /// Continuous targets (one per sample)
    Regression(Vec<f32>),
    /// Class indices (one per sample)
    Classes(Vec<u32>),
}

impl Labels {
    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Regression(v) => v.len(),
            Self::Classes(v) => v.len(),
        }
    }

    /// True if there are no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append(&mut self, other: Self) -> Result<()> {
        match (self, other) {
            (Self::Regression(a), Self::Regression(b)) => a.extend(b),
            (Self::Classes(a), Self::Classes(b)) => a.extend(b),
            _ => {
                return Err(Error::Validation(
                    "cannot mix regression and class labels".to_string(),
                ))
            }
        }
        Ok(())
    }
}

/// `n` samples × `f` features with labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    task: Task,
    features: Vec<f32>,
    labels: Labels,
}

impl Dataset {
    /// Build a dataset, validating the matrix against the task contract.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the matrix is not a multiple of the
    /// task's feature count, the label count differs from the row count, or
    /// the label kind does not match the task's output kind.
    pub fn new(task: Task, features: Vec<f32>, labels: Labels) -> Result<Self> {
        let f = task.input_dim();
        if features.len() % f != 0 {
            return Err(Error::Validation(format!(
                "{} values is not a whole number of {f}-feature rows",
                features.len()
            )));
        }
        let rows = features.len() / f;
        if labels.len() != rows {
            return Err(Error::Validation(format!(
                "{rows} rows but {} labels",
                labels.len()
            )));
        }
        let kind_ok = match (&labels, task.output_kind()) {
            (Labels::Regression(_), crate::task::OutputKind::Regression) => true,
            (Labels::Classes(c), crate::task::OutputKind::Classification { classes }) => {
                c.iter().all(|&class| (class as usize) < classes)
            }
            _ => false,
        };
        if !kind_ok {
            return Err(Error::Validation(format!(
                "labels do not match the output kind of {task}"
            )));
        }
        Ok(Self {
            task,
            features,
            labels,
        })
    }

    /// Task this dataset was generated for.
    #[must_use]
    pub const fn task(&self) -> Task {
        self.task
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if the dataset has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of features per sample.
    #[must_use]
    pub const fn n_features(&self) -> usize {
        self.task.input_dim()
    }

    /// Row-major feature matrix.
    #[must_use]
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    /// Labels.
    #[must_use]
    pub const fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Feature row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        let f = self.n_features();
        &self.features[i * f..(i + 1) * f]
    }

    /// Iterate over feature rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.features.chunks_exact(self.n_features())
    }

    /// Copy of feature column `j`.
    #[must_use]
    pub fn column(&self, j: usize) -> Vec<f32> {
        self.rows().map(|row| row[j]).collect()
    }

    /// First `max_rows` rows, used as int8 calibration samples.
    #[must_use]
    pub fn head(&self, max_rows: usize) -> Vec<Vec<f32>> {
        self.rows().take(max_rows).map(<[f32]>::to_vec).collect()
    }

    /// Convert to an Arrow record batch (one column per feature + `label`).
    ///
    /// # Errors
    ///
    /// Returns an Arrow error if batch construction fails.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields: Vec<Field> = self
            .task
            .feature_names()
            .iter()
            .map(|name| Field::new(*name, DataType::Float32, false))
            .collect();
        let mut columns: Vec<ArrayRef> = (0..self.n_features())
            .map(|j| Arc::new(Float32Array::from(self.column(j))) as ArrayRef)
            .collect();

        match &self.labels {
            Labels::Regression(y) => {
                fields.push(Field::new(LABEL_COLUMN, DataType::Float32, false));
                columns.push(Arc::new(Float32Array::from(y.clone())));
            }
            Labels::Classes(y) => {
                fields.push(Field::new(LABEL_COLUMN, DataType::UInt32, false));
                columns.push(Arc::new(UInt32Array::from(y.clone())));
            }
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }

    /// Rebuild a dataset from a record batch produced by [`Dataset::to_record_batch`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if column names or types do not match the
    /// task's feature contract.
    pub fn from_record_batch(task: Task, batch: &RecordBatch) -> Result<Self> {
        let names = task.feature_names();
        let schema = batch.schema();
        if schema.fields().len() != names.len() + 1 {
            return Err(Error::Validation(format!(
                "expected {} columns for {task}, found {}",
                names.len() + 1,
                schema.fields().len()
            )));
        }

        let mut columns = Vec::with_capacity(names.len());
        for (j, name) in names.iter().enumerate() {
            if schema.field(j).name() != name {
                return Err(Error::Validation(format!(
                    "column {j} is '{}', expected '{name}'",
                    schema.field(j).name()
                )));
            }
            let array = batch
                .column(j)
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| Error::Validation(format!("column '{name}' is not Float32")))?;
            columns.push(array.values().to_vec());
        }

        let label_col = batch.column(names.len());
        let labels = if let Some(y) = label_col.as_any().downcast_ref::<Float32Array>() {
            Labels::Regression(y.values().to_vec())
        } else if let Some(y) = label_col.as_any().downcast_ref::<UInt32Array>() {
            Labels::Classes(y.values().to_vec())
        } else {
            return Err(Error::Validation(
                "label column must be Float32 or UInt32".to_string(),
            ));
        };

        let rows = batch.num_rows();
        let mut features = Vec::with_capacity(rows * names.len());
        for i in 0..rows {
            features.extend(columns.iter().map(|col| col[i]));
        }
        Self::new(task, features, labels)
    }

    /// Write a Parquet snapshot of the dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let batch = self.to_record_batch()?;
        let file = File::create(path.as_ref())?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Load a Parquet snapshot written by [`Dataset::write_parquet`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not match the
    /// task's feature contract.
    pub fn read_parquet<P: AsRef<Path>>(task: Task, path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut dataset: Option<Self> = None;
        for batch in reader {
            let part = Self::from_record_batch(task, &batch?)?;
            match dataset.as_mut() {
                Some(ds) => {
                    ds.features.extend(part.features);
                    ds.labels.append(part.labels)?;
                }
                None => dataset = Some(part),
            }
        }

        dataset.ok_or_else(|| Error::Validation("parquet snapshot holds no rows".to_string()))
    }
}
