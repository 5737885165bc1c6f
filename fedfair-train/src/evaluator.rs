//! Fairness-aware evaluation pass
//!
//! One iteration over the data feeds the standard metrics, both fairness
//! metrics and the optional loss at once. The data is never iterated twice.

use fedfair_common::{format_metrics, log_metrics, EvaluatorConfig, GroupSpec, MetricsMap};
use fedfair_metrics::{
    DemographicParity, EqualOpportunity, FairnessMetric, FairnessReport, MetricRegistry, LOSS_KEY,
};
use tracing::{debug, info};

use crate::data::DataLoader;
use crate::device::{Device, DeviceScope};
use crate::error::TrainError;
use crate::loss::LossFn;
use crate::model::Model;

/// Server- or client-side evaluator reporting loss, standard metrics and
/// the two group-fairness statistics.
#[derive(Debug)]
pub struct FairnessEvaluator {
    config: EvaluatorConfig,
    metrics: MetricRegistry,
    demographic_parity: DemographicParity,
    equal_opportunity: EqualOpportunity,
    last_report: Option<FairnessReport>,
}

impl FairnessEvaluator {
    /// Creates an evaluator with no standard metrics
    pub fn new(config: EvaluatorConfig) -> Self {
        let group = config.group();
        Self {
            config,
            metrics: MetricRegistry::new(),
            demographic_parity: DemographicParity::new(group),
            equal_opportunity: EqualOpportunity::new(group),
            last_report: None,
        }
    }

    /// Sets the evaluator's own standard metrics
    pub fn with_metrics(mut self, metrics: MetricRegistry) -> Self {
        self.metrics = metrics;
        self
    }

    /// Protected-group specification
    pub fn group(&self) -> GroupSpec {
        self.config.group()
    }

    /// Evaluation cadence
    pub fn eval_every(&self) -> usize {
        self.config.eval_every
    }

    /// Returns true if `round` falls on the evaluation cadence.
    pub fn should_evaluate(&self, round: usize) -> bool {
        self.config.eval_every > 0 && round % self.config.eval_every == 0
    }

    /// Fairness counters behind the most recent evaluation
    pub fn last_report(&self) -> Option<&FairnessReport> {
        self.last_report.as_ref()
    }

    /// Evaluates `model` on `loader`.
    ///
    /// Without a model the result is empty and the loader is not touched.
    /// The returned map holds `"loss"` (only with a loss function), every
    /// standard metric by name, `"demographic_parity"` and `"equal_opportunity"`.
    pub fn evaluate(
        &mut self,
        round: usize,
        model: Option<&mut dyn Model>,
        loader: &dyn DataLoader,
        loss_fn: Option<&dyn LossFn>,
        additional_metrics: Option<&mut MetricRegistry>,
        device: Device,
    ) -> Result<MetricsMap, TrainError> {
        self.evaluate_many(round, model, &[loader], loss_fn, additional_metrics, device)
    }

    /// Evaluates `model` over several loaders as one chained pass.
    ///
    /// All loaders feed the same metric instances, so the fairness statistics
    /// describe the union of the data (e.g. every client's test split).
    pub fn evaluate_many(
        &mut self,
        round: usize,
        model: Option<&mut dyn Model>,
        loaders: &[&dyn DataLoader],
        loss_fn: Option<&dyn LossFn>,
        mut additional_metrics: Option<&mut MetricRegistry>,
        device: Device,
    ) -> Result<MetricsMap, TrainError> {
        let Some(model) = model else {
            debug!("Round {}: no model to evaluate", round);
            return Ok(MetricsMap::new());
        };
        self.group().validate_width(model.input_dim())?;

        self.demographic_parity.reset();
        self.equal_opportunity.reset();
        self.metrics.reset_all();
        if let Some(extra) = additional_metrics.as_mut() {
            extra.reset_all();
        }

        let mut model = DeviceScope::acquire(model, device, false);
        let mut running_loss = 0.0f64;
        let mut num_batches = 0usize;
        for batch in loaders.iter().flat_map(|loader| loader.batches()) {
            let outputs = model.forward(batch.inputs())?;
            let (outputs, labels, inputs) = (outputs.view(), batch.labels(), batch.inputs());

            self.metrics.update_all(outputs, labels)?;
            if let Some(extra) = additional_metrics.as_mut() {
                extra.update_all(outputs, labels)?;
            }
            self.demographic_parity.update(outputs, labels, inputs)?;
            self.equal_opportunity.update(outputs, labels, inputs)?;
            if let Some(loss_fn) = loss_fn {
                running_loss += f64::from(loss_fn.value(outputs, labels)?);
            }
            num_batches += 1;
        }
        drop(model);

        let mut results = MetricsMap::new();
        if loss_fn.is_some() {
            results.insert(LOSS_KEY.to_string(), running_loss / num_batches.max(1) as f64);
        }
        self.metrics.compute_into(&mut results);
        if let Some(extra) = additional_metrics.as_deref() {
            extra.compute_into(&mut results);
        }
        let report = FairnessReport::from_metrics(&self.demographic_parity, &self.equal_opportunity);
        report.insert_into(&mut results);

        info!(
            "Round {} evaluation over {} batches: {}",
            round,
            num_batches,
            format_metrics(&results)
        );
        log_metrics("evaluator", round, &results);
        self.last_report = Some(report);
        Ok(results)
    }
}
