use shared::{ClassMetrics, ClassificationReport, ConfusionMatrix};

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

fn class_metrics(tp: u64, fp: u64, fn_: u64, support: u64) -> ClassMetrics {
    let precision = ratio(tp as f64, (tp + fp) as f64);
    let recall = ratio(tp as f64, (tp + fn_) as f64);
    ClassMetrics {
        precision,
        recall,
        f1_score: ratio(2.0 * precision * recall, precision + recall),
        support,
    }
}

/// Confusion matrix and per-class report for binary labels in `{0, 1}`.
/// Matrix rows are the actual class, columns the predicted one.
pub fn evaluate(y_true: &[u8], y_pred: &[u8]) -> (ClassificationReport, ConfusionMatrix) {
    let mut matrix: ConfusionMatrix = [[0; 2]; 2];
    for (&actual, &predicted) in y_true.iter().zip(y_pred) {
        matrix[usize::from(actual.min(1))][usize::from(predicted.min(1))] += 1;
    }
    let [[tn, fp], [fn_, tp]] = matrix;
    let total = tn + fp + fn_ + tp;

    // class 0 treats "bad payer" as the positive outcome
    let bad_payer = class_metrics(tn, fn_, fp, tn + fp);
    let good_payer = class_metrics(tp, fp, fn_, fn_ + tp);

    let average = |weight: &dyn Fn(&ClassMetrics) -> f64| {
        let w0 = weight(&bad_payer);
        let w1 = weight(&good_payer);
        let norm = w0 + w1;
        let mix = |a: f64, b: f64| ratio(w0 * a + w1 * b, norm);
        ClassMetrics {
            precision: mix(bad_payer.precision, good_payer.precision),
            recall: mix(bad_payer.recall, good_payer.recall),
            f1_score: mix(bad_payer.f1_score, good_payer.f1_score),
            support: total,
        }
    };
    let macro_avg = average(&|_| 1.0);
    let weighted_avg = average(&|m| m.support as f64);

    let report = ClassificationReport {
        bad_payer,
        good_payer,
        accuracy: ratio((tp + tn) as f64, total as f64),
        macro_avg,
        weighted_avg,
    };
    (report, matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn report_matches_hand_computed_values() {
        // TN=3, FP=1, FN=2, TP=4
        let y_true = [0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        let y_pred = [0, 0, 0, 1, 0, 0, 1, 1, 1, 1];
        let (report, matrix) = evaluate(&y_true, &y_pred);

        assert_eq!(matrix, [[3, 1], [2, 4]]);
        assert_eq!(report.accuracy, 0.7);
        assert_eq!(report.good_payer.precision, 0.8);
        assert!((report.good_payer.recall - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(report.bad_payer.precision, 0.6);
        assert_eq!(report.bad_payer.recall, 0.75);
        assert_eq!(report.bad_payer.support, 4);
        assert_eq!(report.good_payer.support, 6);
        assert_eq!(report.macro_avg.support, 10);

        let macro_p = (report.bad_payer.precision + report.good_payer.precision) / 2.0;
        assert!((report.macro_avg.precision - macro_p).abs() < 1e-12);
        let weighted_r = (4.0 * report.bad_payer.recall + 6.0 * report.good_payer.recall) / 10.0;
        assert!((report.weighted_avg.recall - weighted_r).abs() < 1e-12);
    }

    #[test]
    fn accuracy_is_trace_over_sum() {
        let y_true = [1, 1, 0, 1, 0, 0, 1];
        let y_pred = [1, 0, 0, 1, 1, 0, 1];
        let (report, m) = evaluate(&y_true, &y_pred);
        let trace = (m[0][0] + m[1][1]) as f64;
        let sum: u64 = m.iter().flatten().sum();
        assert_eq!(report.accuracy, trace / sum as f64);
        for value in [
            report.bad_payer.f1_score,
            report.good_payer.f1_score,
            report.weighted_avg.precision,
        ] {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn empty_denominators_yield_zero() {
        let (report, matrix) = evaluate(&[1, 1, 1], &[1, 1, 1]);
        assert_eq!(matrix, [[0, 0], [0, 3]]);
        assert_eq!(report.bad_payer.precision, 0.0);
        assert_eq!(report.bad_payer.recall, 0.0);
        assert_eq!(report.bad_payer.f1_score, 0.0);
        assert_eq!(report.good_payer.f1_score, 1.0);
        assert_eq!(report.accuracy, 1.0);
    }
}
