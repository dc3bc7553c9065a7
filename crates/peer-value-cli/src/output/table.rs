use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tabled::{builder::Builder, Table};

use peer_value_core::Currency;

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else {
                print_flat_object(value);
            }
        }
        Value::Array(arr) => {
            print_array_table(arr);
        }
        _ => {
            println!("{}", value);
        }
    }
}

fn print_result_table(result: &Value, envelope: &serde_json::Map<String, Value>) {
    let symbol = envelope
        .get("assumptions")
        .and_then(|a| a.get("reporting_currency"))
        .and_then(Value::as_str)
        .map(|code| Currency::from(code.to_string()).symbol())
        .unwrap_or_default();

    match result {
        Value::Object(res_map) if res_map.get("rows").is_some_and(Value::is_array) => {
            print_report(res_map, &symbol);
        }
        Value::Object(res_map) => {
            let mut builder = Builder::default();
            builder.push_record(["Field", "Value"]);
            for (key, val) in res_map {
                if key == "positions" {
                    continue;
                }
                builder.push_record([key.as_str(), &format_value(val)]);
            }
            println!("{}", Table::from(builder));

            if let Some(Value::Array(positions)) = res_map.get("positions") {
                print_positions(positions);
            }
        }
        _ => print_flat_object(&Value::Object(envelope.clone())),
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// Batch summary: one line per stock or fund, best upside first.
fn print_report(report: &serde_json::Map<String, Value>, symbol: &str) {
    let empty = Vec::new();
    let rows = report.get("rows").and_then(Value::as_array).unwrap_or(&empty);

    let mut builder = Builder::default();
    builder.push_record([
        "Type",
        "Source",
        "Ticker",
        "Company",
        "Fair Price",
        "Current Price",
        "Difference",
    ]);
    let (mut stocks, mut funds) = (0usize, 0usize);
    for row in rows {
        let kind = text(row, "kind");
        if kind == "fund" {
            funds += 1;
        } else {
            stocks += 1;
        }
        builder.push_record([
            capitalize(&kind),
            text(row, "source"),
            text(row, "ticker"),
            text(row, "name"),
            format_money(row.get("fair_price"), symbol),
            format_money(row.get("current_price"), symbol),
            format_pct(row.get("difference_pct")),
        ]);
    }
    println!("{}", Table::from(builder));
    println!(
        "\nTotal items valued: {} (Funds: {}, Stocks: {})",
        rows.len(),
        funds,
        stocks
    );

    if let Some(Value::Array(skipped)) = report.get("skipped") {
        if !skipped.is_empty() {
            println!("\nSkipped:");
            for s in skipped {
                match s.get("ticker").and_then(Value::as_str) {
                    Some(ticker) => println!("  - {} / {}: {}", text(s, "source"), ticker, text(s, "reason")),
                    None => println!("  - {}: {}", text(s, "source"), text(s, "reason")),
                }
            }
        }
    }
}

fn print_positions(positions: &[Value]) {
    if positions.is_empty() {
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Ticker", "Shares", "Current Value", "Fair Value", "Difference"]);
    for p in positions {
        let valuation = p.get("valuation");
        builder.push_record([
            valuation.map(|v| text(v, "ticker")).unwrap_or_default(),
            text(p, "share_count"),
            format_money(p.get("current_value"), ""),
            format_money(p.get("fair_value"), ""),
            format_pct(valuation.and_then(|v| v.get("premium_discount_pct"))),
        ]);
    }
    println!("\nPositions:");
    println!("{}", Table::from(builder));
}

fn print_flat_object(value: &Value) {
    if let Value::Object(map) = value {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in map {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        let table = Table::from(builder);
        println!("{}", table);
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        let table = Table::from(builder);
        println!("{}", table);
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn text(value: &Value, key: &str) -> String {
    value.get(key).map(format_value).unwrap_or_default()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn as_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// `€1,234.50`; `n/a` when absent.
fn format_money(value: Option<&Value>, symbol: &str) -> String {
    let Some(amount) = as_decimal(value) else {
        return "n/a".into();
    };
    let fixed = format!("{:.2}", amount.round_dp(2).abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    format!("{sign}{symbol}{grouped}.{frac_part}")
}

/// Signed, one decimal: `+12.3%`.
fn format_pct(value: Option<&Value>) -> String {
    match as_decimal(value) {
        Some(pct) => {
            let pct = pct.round_dp(1);
            let sign = if pct > Decimal::ZERO { "+" } else { "" };
            format!("{sign}{:.1}%", pct)
        }
        None => "n/a".into(),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_money_grouping() {
        assert_eq!(format_money(Some(&json!("1234567.891")), "€"), "€1,234,567.89");
        assert_eq!(format_money(Some(&json!("56.1")), "$"), "$56.10");
        assert_eq!(format_money(Some(&json!("-1000")), "£"), "-£1,000.00");
        assert_eq!(format_money(None, "€"), "n/a");
    }

    #[test]
    fn test_pct_is_signed() {
        assert_eq!(format_pct(Some(&json!("12.34"))), "+12.3%");
        assert_eq!(format_pct(Some(&json!("-43.9"))), "-43.9%");
        assert_eq!(format_pct(Some(&Value::Null)), "n/a");
    }
}
