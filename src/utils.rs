/// info! that keeps ANSI colors only when colorful display is enabled
#[macro_export]
macro_rules! cinfo {
    ($colorful:expr, $($arg:tt)*) => {
        if $colorful {
            log::info!($($arg)*);
        } else {
            log::info!("{}", $crate::utils::strip_ansi(&format!($($arg)*)));
        }
    };
}

/// Remove ANSI escape sequences (`ESC [ ... letter`) from a string
pub fn strip_ansi(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            while let Some(code) = chars.next() {
                if code.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Area under the ROC curve of `value` against `y` (Mann-Whitney statistic, ties counted half).
/// Samples of class 2 are ignored; returns 0.5 when one class is absent.
pub fn compute_auc_from_value(value: &[f64], y: &[u8]) -> f64 {
    let mut scored: Vec<(f64, u8)> = value
        .iter()
        .zip(y.iter())
        .filter(|(_, &class)| class == 0 || class == 1)
        .map(|(&v, &class)| (v, class))
        .collect();

    let n1 = scored.iter().filter(|(_, class)| *class == 1).count() as f64;
    let n0 = scored.len() as f64 - n1;
    if n0 == 0.0 || n1 == 0.0 {
        return 0.5;
    }

    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    // Average ranks over ties
    let mut rank_sum_1 = 0.0;
    let mut i = 0;
    while i < scored.len() {
        let start = i;
        while i + 1 < scored.len() && scored[i].0 == scored[i + 1].0 {
            i += 1;
        }
        let rank = (start + i + 2) as f64 / 2.0;
        rank_sum_1 += rank * scored[start..=i].iter().filter(|(_, class)| *class == 1).count() as f64;
        i += 1;
    }

    (rank_sum_1 - n1 * (n1 + 1.0) / 2.0) / (n0 * n1)
}

/// (accuracy, sensitivity, specificity) of predicted classes; samples of class 2 are ignored
pub fn compute_metrics_from_classes(predicted: &[u8], y: &[u8]) -> (f64, f64, f64) {
    let (mut tp, mut fp, mut tn, mut fn_count) = (0usize, 0usize, 0usize, 0usize);

    for (&pred, &class) in predicted.iter().zip(y.iter()) {
        match (class, pred) {
            (1, 1) => tp += 1,
            (1, _) => fn_count += 1,
            (0, 1) => fp += 1,
            (0, _) => tn += 1,
            _ => {}
        }
    }

    let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
    (
        ratio(tp + tn, tp + tn + fp + fn_count),
        ratio(tp, tp + fn_count),
        ratio(tn, tn + fp),
    )
}
