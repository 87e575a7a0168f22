//! Recursive (exponentially weighted) indicator kernels. Every output at
//! index `i` depends only on inputs `0..=i`; `None` marks missing history.

/// Recursive exponential mean (`adjust = false`), seeded with the first defined
/// value. Emits once `min_periods` defined values have been seen.
pub fn ewm_mean(data: &[Option<f64>], alpha: f64, min_periods: usize) -> Vec<Option<f64>> {
    let mut state: Option<f64> = None;
    let mut seen = 0usize;
    data.iter()
        .map(|value| {
            let x = (*value)?;
            seen += 1;
            let next = match state {
                Some(prev) => prev + alpha * (x - prev),
                None => x,
            };
            state = Some(next);
            (seen >= min_periods).then_some(next)
        })
        .collect()
}

/// EMA with the conventional `2 / (span + 1)` smoothing.
pub fn ema(data: &[Option<f64>], span: usize) -> Vec<Option<f64>> {
    ewm_mean(data, 2.0 / (span as f64 + 1.0), span)
}

/// Neutral RSI used for rows before the first full smoothing window.
pub const RSI_FILL: f64 = 50.0;

/// Wilder RSI. Defined on every row: the warm-up prefix reads as neutral.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        let change = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        gains.push(Some(change.max(0.0)));
        losses.push(Some((-change).max(0.0)));
    }

    let alpha = 1.0 / period.max(1) as f64;
    let avg_gain = ewm_mean(&gains, alpha, period);
    let avg_loss = ewm_mean(&losses, alpha, period);

    avg_gain
        .into_iter()
        .zip(avg_loss)
        .map(|(gain, loss)| match (gain, loss) {
            (Some(_), Some(loss)) if loss == 0.0 => 100.0,
            (Some(gain), Some(loss)) => 100.0 - 100.0 / (1.0 + gain / loss),
            _ => RSI_FILL,
        })
        .collect()
}

pub struct MacdResult {
    pub macd_line: Vec<Option<f64>>,
    pub signal_line: Vec<Option<f64>>,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdResult {
    let closes: Vec<Option<f64>> = closes.iter().copied().map(Some).collect();
    let ema_fast = ema(&closes, fast);
    let ema_slow = ema(&closes, slow);

    let macd_line: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = ema(&macd_line, signal);

    MacdResult {
        macd_line,
        signal_line,
    }
}
