//! Instrument families whose children may carry only a subset of the
//! declared labels.
//!
//! `prometheus::CounterVec` requires a value for every label name, which
//! would force absent labels to be recorded as `""`. A [`SparseVec`] instead
//! keys its children by the [`LabelSet`] actually present and renders each
//! child with just those labels. Children are created on first use.

use crate::labels::LabelSet;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Counter, Error, Histogram, HistogramOpts, Opts, Registry, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Name, help and declared labels shared by every child of a family.
#[derive(Debug, Clone)]
pub struct SparseOpts {
    // ---
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,

    /// Only used by histogram families.
    pub buckets: Vec<f64>,
}

impl SparseOpts {
    // ---
    pub fn new(name: &str, help: &str, label_names: &[&str]) -> Self {
        // ---
        Self {
            name: name.to_owned(),
            help: help.to_owned(),
            label_names: label_names.iter().map(|s| (*s).to_owned()).collect(),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(),
        }
    }
}

/// A metric type that can back one child of a [`SparseVec`].
pub trait SparseMetric: Collector + Clone + 'static {
    /// Builds a child whose constant labels are exactly `labels`.
    fn build(opts: &SparseOpts, labels: &LabelSet) -> Result<Self>;
}

impl SparseMetric for Counter {
    fn build(opts: &SparseOpts, labels: &LabelSet) -> Result<Self> {
        Counter::with_opts(Opts::new(&opts.name, &opts.help).const_labels(labels.to_hash_map()))
    }
}

impl SparseMetric for Histogram {
    fn build(opts: &SparseOpts, labels: &LabelSet) -> Result<Self> {
        // ---
        let hopts = HistogramOpts::new(&opts.name, &opts.help)
            .const_labels(labels.to_hash_map())
            .buckets(opts.buckets.clone());
        Histogram::with_opts(hopts)
    }
}

struct Inner<M> {
    desc: Desc,
    opts: SparseOpts,
    children: DashMap<LabelSet, M>,
}

/// Family of counters or histograms with optional labels.
///
/// Cloning is cheap and every clone shares the same children, so one clone
/// can be boxed into a registry while another is kept for recording.
pub struct SparseVec<M> {
    // ---
    inner: Arc<Inner<M>>,
}

pub type SparseCounterVec = SparseVec<Counter>;
pub type SparseHistogramVec = SparseVec<Histogram>;

impl<M> Clone for SparseVec<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: SparseMetric> SparseVec<M> {
    // ---
    /// Creates an unregistered family.
    ///
    /// # Errors
    ///
    /// Returns error if the name, help string or any label name is invalid.
    pub fn new(opts: SparseOpts) -> Result<Self> {
        // ---
        let desc = Desc::new(
            opts.name.clone(),
            opts.help.clone(),
            opts.label_names.clone(),
            HashMap::new(),
        )?;

        Ok(Self {
            inner: Arc::new(Inner {
                desc,
                opts,
                children: DashMap::new(),
            }),
        })
    }

    /// Creates a family and registers it with `registry`.
    ///
    /// # Errors
    ///
    /// Propagates the registry's error, e.g. `AlreadyReg` for a duplicate name.
    pub fn register(opts: SparseOpts, registry: &Registry) -> Result<Self> {
        // ---
        let family = Self::new(opts)?;
        registry.register(Box::new(family.clone()))?;
        Ok(family)
    }

    /// Returns the child for `labels`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns error if `labels` contains a name the family did not declare.
    pub fn with(&self, labels: &LabelSet) -> Result<M> {
        // ---
        let declared = &self.inner.opts.label_names;
        if let Some(unknown) = labels
            .names()
            .find(|n| !declared.iter().any(|d| d.as_str() == *n))
        {
            return Err(Error::Msg(format!(
                "label '{}' is not declared for metric '{}'",
                unknown, self.inner.opts.name
            )));
        }

        if let Some(child) = self.inner.children.get(labels) {
            return Ok(child.value().clone());
        }

        match self.inner.children.entry(labels.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let child = M::build(&self.inner.opts, labels)?;
                entry.insert(child.clone());
                Ok(child)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.opts.name
    }
}

impl<M: SparseMetric> Collector for SparseVec<M> {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        // ---
        let mut families = self
            .inner
            .children
            .iter()
            .flat_map(|entry| Collector::collect(entry.value()))
            .collect::<Vec<_>>()
            .into_iter();

        let Some(mut merged) = families.next() else {
            return Vec::new();
        };
        for mut family in families {
            for metric in family.take_metric() {
                merged.mut_metric().push(metric);
            }
        }
        vec![merged]
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::labels::{OPERATION, OPERATION_NAME};
    use crate::pipeline::OperationKind;

    fn opts(name: &str) -> SparseOpts {
        SparseOpts::new(name, "test family", &[OPERATION_NAME, OPERATION])
    }

    #[test]
    fn children_render_only_present_labels() {
        // ---
        let registry = Registry::new();
        let family = SparseCounterVec::register(opts("sparse_probe"), &registry)
            .expect("family should register");

        let partial = LabelSet::new().with(OPERATION_NAME, "GetUser");
        let full = partial.clone().with(OPERATION, OperationKind::Query);
        family.with(&partial).expect("child").inc();
        family.with(&full).expect("child").inc_by(2.0);

        let families = registry.gather();
        assert_eq!(families.len(), 1);
        let metrics = families[0].get_metric();
        assert_eq!(metrics.len(), 2);

        for m in metrics {
            let names: Vec<&str> = m.get_label().iter().map(|l| l.get_name()).collect();
            assert!(m.get_label().iter().all(|l| !l.get_value().is_empty()));
            if names.len() == 1 {
                assert_eq!(m.get_counter().get_value(), 1.0);
            } else {
                assert_eq!(m.get_counter().get_value(), 2.0);
            }
        }
    }

    #[test]
    fn same_labels_share_a_child() {
        // ---
        let family = SparseCounterVec::new(opts("sparse_shared")).expect("family");
        let labels = LabelSet::new().with(OPERATION, OperationKind::Mutation);

        family.with(&labels).expect("child").inc();
        family.with(&labels).expect("child").inc();

        let families = Collector::collect(&family);
        assert_eq!(families[0].get_metric().len(), 1);
        assert_eq!(family.with(&labels).expect("child").get(), 2.0);
    }

    #[test]
    fn undeclared_label_is_rejected() {
        // ---
        let family = SparseCounterVec::new(opts("sparse_strict")).expect("family");
        let labels = LabelSet::new().with("tenant", "acme");
        assert!(matches!(family.with(&labels), Err(Error::Msg(_))));
    }

    #[test]
    fn duplicate_registration_propagates_registry_error() {
        // ---
        let registry = Registry::new();
        SparseCounterVec::register(opts("sparse_dup"), &registry).expect("first registers");
        let second = SparseCounterVec::register(opts("sparse_dup"), &registry);
        assert!(matches!(second, Err(Error::AlreadyReg)));
    }

    #[test]
    fn empty_family_is_not_gathered() {
        // ---
        let registry = Registry::new();
        SparseHistogramVec::register(opts("sparse_idle"), &registry).expect("registers");
        assert!(registry.gather().is_empty());
    }

    #[test]
    fn histogram_child_uses_configured_buckets() {
        // ---
        let family = SparseHistogramVec::new(SparseOpts {
            buckets: vec![0.1, 1.0],
            ..opts("sparse_hist")
        })
        .expect("family");
        let child = family.with(&LabelSet::new()).expect("child");
        child.observe(0.5);

        let mf = Collector::collect(&family);
        let h = mf[0].get_metric()[0].get_histogram();
        assert_eq!(h.get_sample_count(), 1);
        assert_eq!(h.get_bucket().len(), 2);
        assert_eq!(h.get_bucket()[0].get_cumulative_count(), 0);
        assert_eq!(h.get_bucket()[1].get_cumulative_count(), 1);
    }
}
