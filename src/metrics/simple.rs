use super::{Metric, MetricCell, MetricInfo, Value};

/// A metric whose value is set directly by its collector.
#[derive(Debug)]
pub struct SimpleMetric {
    cell: MetricCell,
}

impl SimpleMetric {
    pub fn new(
        name: impl Into<String>,
        units: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        Self {
            cell: MetricCell::new(MetricInfo::new(name, units, desc)),
        }
    }

    /// Informational bounds.
    pub fn with_bounds(mut self, min_val: f64, max_val: f64) -> Self {
        let info = self.cell.info_mut();
        info.min_val = min_val;
        info.max_val = max_val;
        self
    }

    pub fn with_min(mut self, min_val: f64) -> Self {
        self.cell.info_mut().min_val = min_val;
        self
    }

    pub fn lower_is_better(mut self) -> Self {
        self.cell.info_mut().higher_is_better = false;
        self
    }

    pub fn set_value(&self, value: impl Into<Value>) {
        self.cell.set_value(value.into());
    }
}

impl Metric for SimpleMetric {
    fn cell(&self) -> &MetricCell {
        &self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_accepts_any_scalar() {
        let m = SimpleMetric::new("m", "#", "anything");
        m.set_value(3);
        assert_eq!(m.value(), Some(Value::Int(3)));
        m.set_value("up");
        assert_eq!(m.value(), Some(Value::Text("up".into())));
        assert!(m.timestamp().is_some());
    }

    #[test]
    fn test_builder_sets_info() {
        let m = SimpleMetric::new("latency", "ms", "request latency")
            .with_bounds(0.0, 1000.0)
            .lower_is_better();
        let snap = m.snapshot();
        assert_eq!(snap.min_val, Some(0.0));
        assert_eq!(snap.max_val, Some(1000.0));
        assert!(!snap.higher_is_better);
        assert!(snap.val.is_none());
    }
}
