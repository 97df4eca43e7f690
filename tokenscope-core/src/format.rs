//! Display formatting helpers

/// Format a token count compactly: `982`, `14.2K`, `3.1M`, `1.2B`.
pub fn format_tokens(count: u64) -> String {
    const K: f64 = 1_000.0;
    const M: f64 = 1_000_000.0;
    const B: f64 = 1_000_000_000.0;

    let count = count as f64;
    if count >= B {
        format!("{:.1}B", count / B)
    } else if count >= M {
        format!("{:.1}M", count / M)
    } else if count >= K {
        format!("{:.1}K", count / K)
    } else {
        format!("{count:.0}")
    }
}

/// Format a dollar amount: cents precision above a dollar, tenth-of-a-cent
/// below so small sessions do not all print as `$0.00`.
pub fn format_cost(dollars: f64) -> String {
    if dollars >= 1.0 {
        format!("${dollars:.2}")
    } else {
        format!("${dollars:.3}")
    }
}
