//! Indicator primitives over a slice of closes, oldest first.

/// Mean of the last `period` values, or `None` when there are fewer.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average, smoothing factor `2 / (period + 1)`.
///
/// The first value is the simple mean of the first `period` inputs, so the
/// returned series is `values.len() - period + 1` long and its element `i`
/// lines up with `values[i + period - 1]`.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return vec![];
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &v in &values[period..] {
        prev = (v - prev) * k + prev;
        out.push(prev);
    }
    out
}

/// Wilder RSI at the latest close. Needs `period + 1` closes.
///
/// A series with no movement at all reads 50; gains without losses read 100.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for pair in closes.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let n = period as f64;
    let mut avg_gain = gains[..period].iter().sum::<f64>() / n;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / n;
    for i in period..gains.len() {
        avg_gain = (avg_gain * (n - 1.0) + gains[i]) / n;
        avg_loss = (avg_loss * (n - 1.0) + losses[i]) / n;
    }

    if avg_loss <= 0.0 {
        return Some(if avg_gain <= 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some((100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    /// Aligned with `signal`: `histogram[i] = line[i + offset] - signal[i]`.
    pub histogram: Vec<f64>,
}

/// MACD line, signal line and histogram. Empty when the input is too short
/// (`slow + signal - 1` closes) or the periods are degenerate.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let empty = MacdSeries {
        line: vec![],
        signal: vec![],
        histogram: vec![],
    };
    if fast == 0 || signal == 0 || fast >= slow {
        return empty;
    }

    let ema_fast = ema_series(closes, fast);
    let ema_slow = ema_series(closes, slow);
    if ema_slow.is_empty() {
        return empty;
    }

    // ema_fast[j] lines up with closes[j + fast - 1]; ema_slow[i] with closes[i + slow - 1].
    let offset = slow - fast;
    let line: Vec<f64> = ema_slow
        .iter()
        .enumerate()
        .map(|(i, slow_v)| ema_fast[i + offset] - slow_v)
        .collect();

    let signal_line = ema_series(&line, signal);
    if signal_line.is_empty() {
        return empty;
    }

    let hist_offset = line.len() - signal_line.len();
    let histogram = signal_line
        .iter()
        .enumerate()
        .map(|(i, s)| line[i + hist_offset] - s)
        .collect();

    MacdSeries {
        line,
        signal: signal_line,
        histogram,
    }
}
