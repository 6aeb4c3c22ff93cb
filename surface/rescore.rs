//! # Questionnaire Rescoring
//!
//! Rebuilds the two attachment subscale scores from the twelve raw item
//! columns and reports internal consistency (Cronbach's alpha) per subscale.
//!
//! Policy decisions that the scores depend on:
//! - A response outside `[0, scale_max]` is treated as missing.
//! - Reverse-keyed items are flipped once, `x' = scale_max - x`, before any
//!   use (mean and reliability alike).
//! - A subscale mean requires every item of that subscale; one missing item
//!   makes the row's score missing. The two subscales are independent.
//! - Reliability uses listwise deletion over the subscale's items.

use crate::config::QuestionnaireKey;
use crate::table::{Column, RowSet};
use ndarray::{Array2, Axis};
use serde::Serialize;

/// Internal-consistency summary for one subscale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReliabilityReport {
    pub subscale: String,
    /// Undefined for fewer than two items, fewer than two complete rows, or a
    /// zero-variance total score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    pub complete_cases: usize,
    pub n_items: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RescoreOutcome {
    /// At least one item column is absent; nothing was scored.
    Unavailable { missing: Vec<String> },
    /// The key names items it cannot resolve; nothing was scored.
    InvalidKey { reason: String },
    Scored {
        anxiety: Column,
        avoidance: Column,
        reliability: Vec<ReliabilityReport>,
    },
}

/// Reverse-codes one response on a `0..=scale_max` scale.
pub fn reverse_item(x: f64, scale_max: f64) -> f64 {
    scale_max - x
}

/// Rescores both subscales from item-level data.
pub fn rescore(rows: &RowSet, key: &QuestionnaireKey) -> RescoreOutcome {
    if let Err(e) = key.validate() {
        log::warn!("Questionnaire rescoring unavailable: {e}");
        return RescoreOutcome::InvalidKey { reason: e.to_string() };
    }
    let missing: Vec<String> = key
        .item_columns
        .iter()
        .filter(|name| !rows.has_column(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        log::warn!(
            "Questionnaire rescoring unavailable; {} item column(s) absent: {:?}",
            missing.len(),
            missing
        );
        return RescoreOutcome::Unavailable { missing };
    }

    let keyed = |item: usize| -> Column {
        let name = &key.item_columns[item - 1];
        let reversed = key.reversed_items.contains(&item);
        rows.column(name)
            .unwrap_or_default()
            .iter()
            .map(|v| {
                v.filter(|x| (0.0..=key.scale_max).contains(x))
                    .map(|x| if reversed { reverse_item(x, key.scale_max) } else { x })
            })
            .collect()
    };

    let anxiety_items: Vec<Column> = key.anxiety_items.iter().map(|&i| keyed(i)).collect();
    let avoidance_items: Vec<Column> = key.avoidance_items.iter().map(|&i| keyed(i)).collect();

    let reliability = vec![
        cronbach_alpha("anxiety", &anxiety_items),
        cronbach_alpha("avoidance", &avoidance_items),
    ];
    for report in &reliability {
        match report.alpha {
            Some(alpha) => log::info!(
                "Reliability ({}): alpha = {alpha:.3} over {} complete cases, {} items",
                report.subscale,
                report.complete_cases,
                report.n_items
            ),
            None => log::warn!(
                "Reliability ({}) undefined: {} complete cases, {} items",
                report.subscale,
                report.complete_cases,
                report.n_items
            ),
        }
    }

    RescoreOutcome::Scored {
        anxiety: subscale_mean(&anxiety_items, rows.n_rows()),
        avoidance: subscale_mean(&avoidance_items, rows.n_rows()),
        reliability,
    }
}

/// Unweighted per-row mean, missing unless every item is present.
fn subscale_mean(items: &[Column], n_rows: usize) -> Column {
    (0..n_rows)
        .map(|row| {
            let values: Option<Vec<f64>> = items.iter().map(|item| item[row]).collect();
            values
                .filter(|v| !v.is_empty())
                .map(|v| v.iter().sum::<f64>() / v.len() as f64)
        })
        .collect()
}

/// Cronbach's alpha over the rows where every item is present.
///
/// `alpha = k/(k-1) * (1 - sum(item variances) / variance(row sums))`, with
/// sample variances (divisor N-1) throughout.
pub fn cronbach_alpha(subscale: &str, items: &[Column]) -> ReliabilityReport {
    let k = items.len();
    let n_rows = items.first().map_or(0, Vec::len);
    let complete: Vec<Vec<f64>> = (0..n_rows)
        .filter_map(|row| items.iter().map(|item| item[row]).collect())
        .collect();

    let report = |alpha| ReliabilityReport {
        subscale: subscale.to_string(),
        alpha,
        complete_cases: complete.len(),
        n_items: k,
    };

    if k < 2 || complete.len() < 2 {
        return report(None);
    }

    let flat: Vec<f64> = complete.iter().flatten().copied().collect();
    let matrix = match Array2::from_shape_vec((complete.len(), k), flat) {
        Ok(matrix) => matrix,
        Err(_) => return report(None),
    };

    let item_variance_sum = matrix.var_axis(Axis(0), 1.0).sum();
    let total_variance = matrix.sum_axis(Axis(1)).var(1.0);
    if total_variance == 0.0 || !total_variance.is_finite() {
        return report(None);
    }

    let k = k as f64;
    report(Some(k / (k - 1.0) * (1.0 - item_variance_sum / total_variance)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn item_rows(responses: &[[f64; 12]]) -> RowSet {
        let key = QuestionnaireKey::default();
        let mut rows = RowSet::new((1..=responses.len()).map(|i| i.to_string()).collect());
        for (idx, name) in key.item_columns.iter().enumerate() {
            rows.add_column(name, responses.iter().map(|r| Some(r[idx])).collect())
                .unwrap();
        }
        rows
    }

    #[test]
    fn reversal_is_an_involution_on_the_scale() {
        for x in [0.0, 1.0, 2.0, 3.0, 4.0] {
            assert_eq!(reverse_item(reverse_item(x, 4.0), 4.0), x);
        }
        assert_eq!(reverse_item(1.0, 4.0), 3.0);
    }

    #[test]
    fn rescoring_applies_the_key() {
        // Anxiety items 1,2,5,8,10,11 answered 2; avoidance items 6,7 answered 1
        // and reversed items 3,4,9,12 answered 0, which become 4.
        let mut responses = [2.0; 12];
        for item in [6, 7] {
            responses[item - 1] = 1.0;
        }
        for item in [3, 4, 9, 12] {
            responses[item - 1] = 0.0;
        }
        let rows = item_rows(&[responses, [4.0; 12]]);

        match rescore(&rows, &QuestionnaireKey::default()) {
            RescoreOutcome::Scored {
                anxiety, avoidance, ..
            } => {
                assert_abs_diff_eq!(anxiety[0].unwrap(), 2.0, epsilon = 1e-12);
                assert_abs_diff_eq!(avoidance[0].unwrap(), (1.0 + 1.0 + 4.0 * 4.0) / 6.0, epsilon = 1e-12);
                assert_abs_diff_eq!(anxiety[1].unwrap(), 4.0, epsilon = 1e-12);
                // Two items at 4 and four reversed items at 0.
                assert_abs_diff_eq!(avoidance[1].unwrap(), 8.0 / 6.0, epsilon = 1e-12);
            }
            other => panic!("expected scores, got {other:?}"),
        }
    }

    #[test]
    fn missing_item_column_makes_rescoring_unavailable() {
        let key = QuestionnaireKey::default();
        let mut rows = RowSet::new(vec!["1".into()]);
        for name in key.item_columns.iter().take(11) {
            rows.add_column(name, vec![Some(1.0)]).unwrap();
        }
        assert_eq!(
            rescore(&rows, &key),
            RescoreOutcome::Unavailable {
                missing: vec!["ecr_item_12".into()]
            }
        );
    }

    #[test]
    fn unresolvable_item_numbers_make_rescoring_unavailable() {
        let rows = item_rows(&[[2.0; 12]]);
        for bad in [0, 13] {
            let mut key = QuestionnaireKey::default();
            key.anxiety_items[0] = bad;
            assert!(
                matches!(rescore(&rows, &key), RescoreOutcome::InvalidKey { .. }),
                "item {bad}"
            );
        }
    }

    #[test]
    fn one_missing_item_nulls_only_its_subscale() {
        let key = QuestionnaireKey::default();
        let rows = {
            let mut rows = RowSet::new(vec!["1".into()]);
            for (idx, name) in key.item_columns.iter().enumerate() {
                // Item 1 (anxiety) is out of range and therefore missing.
                let value = if idx == 0 { 9.0 } else { 2.0 };
                rows.add_column(name, vec![Some(value)]).unwrap();
            }
            rows
        };
        match rescore(&rows, &key) {
            RescoreOutcome::Scored {
                anxiety, avoidance, ..
            } => {
                assert_eq!(anxiety, vec![None]);
                assert_abs_diff_eq!(avoidance[0].unwrap(), 2.0, epsilon = 1e-12);
            }
            other => panic!("expected scores, got {other:?}"),
        }
    }

    #[test]
    fn alpha_of_identical_items_is_one() {
        let a = vec![Some(1.0), Some(2.0), Some(3.0)];
        let report = cronbach_alpha("pair", &[a.clone(), a]);
        assert_abs_diff_eq!(report.alpha.unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(report.complete_cases, 3);
        assert_eq!(report.n_items, 2);
    }

    #[test]
    fn alpha_matches_hand_computation_with_listwise_deletion() {
        // Row 4 is dropped because item c is missing there.
        let a = vec![Some(1.0), Some(2.0), Some(4.0), Some(0.0)];
        let b = vec![Some(2.0), Some(2.0), Some(3.0), Some(1.0)];
        let c = vec![Some(1.0), Some(3.0), Some(4.0), None];
        let report = cronbach_alpha("abc", &[a, b, c]);
        assert_eq!(report.complete_cases, 3);
        // Sample variances: a = 7/3, b = 1/3, c = 7/3; totals 4, 7, 11 -> 37/3.
        let expected = 1.5 * (1.0 - 5.0 / (37.0 / 3.0));
        assert_abs_diff_eq!(report.alpha.unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn alpha_is_undefined_for_degenerate_inputs() {
        let single = cronbach_alpha("one", &[vec![Some(1.0), Some(2.0)]]);
        assert_eq!(single.alpha, None);

        let one_row = cronbach_alpha("row", &[vec![Some(1.0)], vec![Some(2.0)]]);
        assert_eq!(one_row.alpha, None);
        assert_eq!(one_row.complete_cases, 1);

        let flat = cronbach_alpha("flat", &[vec![Some(1.0), Some(1.0)], vec![Some(2.0), Some(2.0)]]);
        assert_eq!(flat.alpha, None);

        let empty = cronbach_alpha("empty", &[]);
        assert_eq!(empty.alpha, None);
        assert_eq!(empty.complete_cases, 0);
    }
}
