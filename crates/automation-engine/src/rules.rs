//! Rules engine: sensor snapshot + thresholds + actuators → decisions and alerts
//!
//! Evaluation is a pure function. Each actuator is decided independently
//! from its own metric; the low-water safety pass runs last and dominates
//! every other rule for water-circuit actuators.

use crate::model::{ActuatorDecision, DecisionReason, Evaluation, SkipReason};
use hydro_core::device::Comparator;
use hydro_core::{Actuator, ActuatorType, Alert, EffectiveThresholds, Metric, SensorSnapshot};
use std::collections::BTreeSet;

/// Evaluate all actuators of one device against a snapshot
#[must_use]
pub fn evaluate(
    snapshot: &SensorSnapshot,
    thresholds: &EffectiveThresholds,
    actuators: &[Actuator],
) -> Evaluation {
    let mut evaluation = Evaluation::default();
    let active = move || actuators.iter().filter(|a| a.active);

    for actuator in active() {
        match decide(actuator, snapshot, thresholds) {
            Ok(decision) => evaluation.decisions.push(decision),
            Err(skip) => {
                tracing::debug!("No decision for actuator {}: {:?}", actuator.id, skip);
                evaluation.skipped.push((actuator.id, skip));
            }
        }
    }

    apply_safety_interlock(&mut evaluation, snapshot, thresholds, active());
    evaluation
        .alerts
        .extend(nutrient_alerts(snapshot, thresholds, active()));

    evaluation
}

/// Metrics an actuator is wired to
fn resolve_metrics(actuator: &Actuator) -> Result<Vec<Metric>, SkipReason> {
    match &actuator.sensor_key {
        Some(key) => key
            .parse::<Metric>()
            .map(|metric| vec![metric])
            .map_err(|_| SkipReason::UnknownSensorKey { key: key.clone() }),
        None => Ok(actuator.kind.default_metrics().to_vec()),
    }
}

/// Type comparator for a single actuator
fn decide(
    actuator: &Actuator,
    snapshot: &SensorSnapshot,
    thresholds: &EffectiveThresholds,
) -> Result<ActuatorDecision, SkipReason> {
    let metrics = resolve_metrics(actuator)?;
    let Some(&first) = metrics.first() else {
        return Err(SkipReason::NoMetricConfigured);
    };

    let readings: Vec<(Metric, f64)> = metrics
        .iter()
        .filter_map(|&m| snapshot.get(m).map(|v| (m, v)))
        .collect();
    let Some(&(first_present, first_value)) = readings.first() else {
        return Err(SkipReason::MissingSensorMetric { metric: first });
    };

    let fired = readings.iter().find_map(|&(metric, value)| {
        let bounds = thresholds.bounds(metric);
        match actuator.kind.comparator() {
            Comparator::BelowMin if value < bounds.min => Some(DecisionReason::BelowMin {
                metric,
                value,
                min: bounds.min,
            }),
            Comparator::AboveMax if value > bounds.max => Some(DecisionReason::AboveMax {
                metric,
                value,
                max: bounds.max,
            }),
            _ => None,
        }
    });

    Ok(match fired {
        Some(reason) => ActuatorDecision {
            actuator_id: actuator.id,
            desired_state: true,
            reason,
        },
        None => ActuatorDecision {
            actuator_id: actuator.id,
            desired_state: false,
            reason: DecisionReason::WithinRange {
                metric: first_present,
                value: first_value,
            },
        },
    })
}

/// Force every water-circuit actuator off when the tank is critically low
fn apply_safety_interlock<'a>(
    evaluation: &mut Evaluation,
    snapshot: &SensorSnapshot,
    thresholds: &EffectiveThresholds,
    actuators: impl Iterator<Item = &'a Actuator>,
) {
    let critical = thresholds.water_level_critical;
    let Some(level) = snapshot.water_level.filter(|level| *level < critical) else {
        return;
    };

    let reason = DecisionReason::SafetyInterlock {
        water_level: level,
        critical,
    };

    for actuator in actuators.filter(|a| a.kind.is_water_circuit()) {
        let forced = ActuatorDecision {
            actuator_id: actuator.id,
            desired_state: false,
            reason,
        };
        match evaluation
            .decisions
            .iter_mut()
            .find(|d| d.actuator_id == actuator.id)
        {
            Some(decision) => *decision = forced,
            None => {
                evaluation.skipped.retain(|(id, _)| *id != actuator.id);
                evaluation.decisions.push(forced);
            }
        }
    }

    evaluation.alerts.push(Alert::water_level_critical(
        snapshot.device_id,
        level,
        critical,
        snapshot.timestamp,
    ));
}

/// EC/PPM range alerts for metrics referenced by nutrient pumps
fn nutrient_alerts<'a>(
    snapshot: &SensorSnapshot,
    thresholds: &EffectiveThresholds,
    actuators: impl Iterator<Item = &'a Actuator>,
) -> Vec<Alert> {
    let referenced: BTreeSet<Metric> = actuators
        .filter(|a| a.kind == ActuatorType::NutrientPump)
        .filter_map(|a| a.sensor_key.as_deref())
        .filter_map(|key| key.parse::<Metric>().ok())
        .filter(|m| matches!(m, Metric::Ec | Metric::Ppm))
        .collect();

    referenced
        .into_iter()
        .filter_map(|metric| {
            let value = snapshot.get(metric)?;
            let bounds = thresholds.bounds(metric);
            bounds.is_out_of_range(value).then(|| {
                Alert::nutrient_out_of_range(
                    snapshot.device_id,
                    metric,
                    value,
                    bounds.min,
                    bounds.max,
                    snapshot.timestamp,
                )
            })
        })
        .collect()
}
