//! Diagnostic tool - Check configuration before running vedex
//!
//! Run with: cargo run --bin diagnose

use std::env;

/// Present and a well-formed 20-byte hex address
fn is_address(value: &str) -> bool {
    let hex = value.trim().trim_start_matches("0x");
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// First 30 and last 15 characters of long values
fn shorten(value: &str) -> String {
    let count = value.chars().count();
    if count <= 50 {
        return value.to_string();
    }
    let head: String = value.chars().take(30).collect();
    let tail: String = value.chars().skip(count - 15).collect();
    format!("{}...{}", head, tail)
}

fn main() {
    println!("🔍 VEDEX DIAGNOSTIC CHECK\n");

    // Load .env
    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("CHAIN_ID", "10", "Chain the contracts live on"),
        ("MULTICALL_CHUNK_SIZE", "100", "Calls per aggregate3 batch"),
        ("MAX_CHUNKS_IN_FLIGHT", "4", "Batches read concurrently"),
        ("SLIPPAGE_BPS", "50", "Slippage tolerance for liquidity and swaps"),
        ("DEADLINE_SECS", "1800", "Router deadline"),
        ("GAS_BUFFER_PCT", "20", "Headroom on top of gas estimates"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    // RPC check
    let rpc = env::var("RPC_URL").unwrap_or_else(|_| "NOT SET (public endpoint)".to_string());
    println!("  RPC_URL: {}", shorten(&rpc));

    println!("\n═══════════════════════════════════════════════════");
    println!("                    CONTRACTS                       ");
    println!("═══════════════════════════════════════════════════\n");

    let contracts = [
        ("ROUTER_ADDRESS", true),
        ("VOTER_ADDRESS", true),
        ("VOTING_ESCROW_ADDRESS", true),
        ("REWARDS_DISTRIBUTOR_ADDRESS", false),
        ("SECONDARY_VOTER_ADDRESS", false),
    ];

    let mut missing_required = 0;
    for (key, required) in contracts {
        let status = match env::var(key) {
            Ok(v) if is_address(&v) => "✅ Set".to_string(),
            Ok(v) => format!("❌ Invalid address '{}'", v),
            Err(_) if required => {
                missing_required += 1;
                "❌ Not set (required)".to_string()
            }
            Err(_) => "➖ Not set (optional)".to_string(),
        };
        println!("  {:<28} {}", key, status);
    }

    let gov = env::var("GOVERNANCE_TOKEN").ok();
    println!(
        "  {:<28} {}",
        "GOVERNANCE_TOKEN",
        match &gov {
            Some(t) if t.split(':').count() == 3 => "✅ Set",
            Some(_) => "❌ Expected address:symbol:decimals",
            None => "❌ Not set (locks unavailable)",
        }
    );

    let assets = env::var("BASE_ASSETS")
        .map(|s| s.split(',').filter(|t| !t.trim().is_empty()).count())
        .unwrap_or(0);
    println!("  {:<28} {} token(s)", "BASE_ASSETS", assets);

    let pairs = match (env::var("PAIR_LIST_PATH"), env::var("PAIR_LIST_URL")) {
        (Ok(path), _) => format!("✅ File {}", path),
        (Err(_), Ok(url)) => format!("✅ Service {}", url),
        _ => "⚠️  None (no positions will be shown)".to_string(),
    };
    println!("  {:<28} {}", "PAIR LIST", pairs);

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    let signer = env::var("PRIVATE_KEY").map(|k| !k.is_empty()).unwrap_or(false);
    let account = env::var("ACCOUNT").map(|a| is_address(&a)).unwrap_or(false);

    if signer {
        println!("  ✍️  SIGNING MODE");
        println!("     → Workflows WILL submit real transactions");
    } else if account {
        println!("  👀 READ-ONLY MODE");
        println!("     → snapshot and rewards work; writes will fail");
    } else {
        println!("  ❓ No PRIVATE_KEY or ACCOUNT set");
        println!("     → Nothing can be read");
    }

    if missing_required > 0 {
        println!("\n  ⚠️  {} required contract address(es) missing!", missing_required);
        println!("     vedex will refuse to start until configured.");
    }

    println!("\n✅ Diagnostic complete!\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_keeps_short_values() {
        assert_eq!(shorten("https://mainnet.optimism.io"), "https://mainnet.optimism.io");
    }

    #[test]
    fn test_shorten_cuts_on_char_boundaries() {
        let rpc = format!("https://rpc.example/{}/{}", "ключ".repeat(10), "é".repeat(20));
        let short = shorten(&rpc);
        assert!(short.starts_with("https://rpc.example/ключ"));
        assert!(short.ends_with(&"é".repeat(15)));
        assert_eq!(short.chars().count(), 30 + 3 + 15);
    }
}
