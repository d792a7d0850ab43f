//! # Seed Data Generator
//!
//! Populates a branch with products and customers for development.
//!
//! ## Usage
//! ```bash
//! # Seed the configured database and branch
//! cargo run -p caja-db --bin seed
//!
//! # Specify database path and branch
//! cargo run -p caja-db --bin seed -- --db ./data/caja.db --branch norte
//!
//! # More customers
//! cargo run -p caja-db --bin seed -- --customers 50
//! ```
//!
//! Every catalog entry is created in four pack sizes; stock and minimums
//! vary so that some products start at or below their reorder threshold.

use caja_core::{Customer, Money, Product};
use caja_db::{init_tracing, CajaConfig, Database, DbConfig};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// (name, base price in cents, cost as a percentage of price)
const CATALOG: &[(&str, i64, i64)] = &[
    ("Arroz Costeño", 420, 82),
    ("Azúcar Rubia", 390, 85),
    ("Aceite Primor", 1090, 80),
    ("Leche Gloria", 450, 84),
    ("Fideos Don Vittorio", 310, 75),
    ("Atún Florida", 690, 78),
    ("Inca Kola", 250, 70),
    ("Coca-Cola", 250, 70),
    ("Pan de Molde Bimbo", 790, 76),
    ("Mantequilla Laive", 650, 80),
    ("Galletas Soda Field", 120, 65),
    ("Detergente Bolívar", 1290, 79),
    ("Jabón Camay", 350, 72),
    ("Papel Higiénico Suave", 1590, 81),
    ("Huevos (docena)", 720, 88),
];

/// (suffix, price multiplier in percent)
const SIZES: &[(&str, i64)] = &[("", 100), ("x2", 195), ("x6", 560), ("x12", 1080)];

const CUSTOMERS: &[&str] = &[
    "Rosa Quispe",
    "Juan Mamani",
    "Carmen Huamán",
    "Luis Flores",
    "Ana Torres",
    "Pedro Condori",
    "María Rojas",
    "Jorge Chávez",
];

struct Args {
    db_path: Option<PathBuf>,
    branch: Option<String>,
    customers: usize,
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args {
        db_path: None,
        branch: None,
        customers: CUSTOMERS.len(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" if i + 1 < args.len() => {
                parsed.db_path = Some(PathBuf::from(&args[i + 1]));
                i += 1;
            }
            "--branch" | "-b" if i + 1 < args.len() => {
                parsed.branch = Some(args[i + 1].clone());
                i += 1;
            }
            "--customers" | "-c" if i + 1 < args.len() => {
                parsed.customers = args[i + 1].parse().unwrap_or(CUSTOMERS.len());
                i += 1;
            }
            "--help" | "-h" => {
                println!("Caja POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (default: from caja.toml)");
                println!("  -b, --branch <NAME>    Branch to seed (default: from caja.toml)");
                println!("  -c, --customers <N>    Number of customers (default: {})", CUSTOMERS.len());
                println!("  -h, --help             Show this help message");
                return None;
            }
            _ => {}
        }
        i += 1;
    }

    Some(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let Some(args) = parse_args() else {
        return Ok(());
    };

    let config = CajaConfig::load(None)?;
    let branch = args.branch.unwrap_or_else(|| config.branch().to_string());
    let db_config = match args.db_path {
        Some(path) => DbConfig::new(path),
        None => config.db_config(),
    };

    println!("🌱 Caja POS Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_config.database_path.display());
    println!("Branch:   {}", branch);
    println!();

    let db = Database::new(db_config).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut generated = 0usize;
    for (index, (name, price, cost_pct)) in CATALOG.iter().enumerate() {
        for (size_idx, (suffix, multiplier)) in SIZES.iter().enumerate() {
            let product = generate_product(
                &branch,
                name,
                suffix,
                *price,
                *cost_pct,
                *multiplier,
                index * SIZES.len() + size_idx,
            );
            if let Err(e) = db.products().insert(&product).await {
                eprintln!("Failed to insert {}: {}", product.name, e);
                continue;
            }
            generated += 1;
        }
    }
    println!("✓ Generated {} products in {:?}", generated, start.elapsed());

    let mut customers = 0usize;
    for i in 0..args.customers {
        let base = CUSTOMERS[i % CUSTOMERS.len()];
        let name = if i < CUSTOMERS.len() {
            base.to_string()
        } else {
            format!("{} {}", base, i / CUSTOMERS.len() + 1)
        };
        db.customers().insert(&Customer::new(name, branch.as_str())).await?;
        customers += 1;
    }
    println!("✓ Generated {} customers", customers);

    let low = db.products().list_low_stock(&branch).await?;
    println!();
    println!("Products at or below minimum stock: {}", low.len());
    info!(
        branch = %branch,
        products = generated,
        customers,
        low_stock = low.len(),
        "Seed complete"
    );

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Builds one product; `seed` spreads stock and minimums deterministically.
fn generate_product(
    branch: &str,
    name: &str,
    suffix: &str,
    base_price: i64,
    cost_pct: i64,
    multiplier: i64,
    seed: usize,
) -> Product {
    let price = base_price * multiplier / 100;
    let cost = price * cost_pct / 100;
    let stock = (seed * 7 % 40) as i64;
    let min_stock = 3 + (seed % 5) as i64;

    let full_name = if suffix.is_empty() {
        name.to_string()
    } else {
        format!("{} {}", name, suffix)
    };

    Product::new(
        full_name,
        branch,
        Money::from_cents(price),
        Money::from_cents(cost),
        stock,
        min_stock,
    )
}
