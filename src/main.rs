use anyhow::Result;
use rusqlite::Connection;
use std::env;
use std::path::Path;

use treaty_reconcile::{
    export_csv, insert_run, setup_database, verify_count, PipelineConfig, PipelineError, ReconciliationPipeline,
    SourceSet,
};

const DEFAULT_CONFIG: &str = "treaty-reconcile.json";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config_arg = args.get(2).map(String::as_str);

    match args.get(1).map(String::as_str) {
        Some("run") => run(config_arg)?,
        Some("check") => check(config_arg)?,
        _ => {
            eprintln!("Usage:");
            eprintln!("   treaty-reconcile run [config.json]");
            eprintln!("   treaty-reconcile check [config.json]");
            std::process::exit(2);
        }
    }

    Ok(())
}

/// Explicit path, else ./treaty-reconcile.json when present, else defaults
fn load_config(path: Option<&str>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_file(p),
        None if Path::new(DEFAULT_CONFIG).exists() => PipelineConfig::from_file(DEFAULT_CONFIG),
        None => Ok(PipelineConfig::default()),
    }
}

fn run(config_path: Option<&str>) -> Result<()> {
    println!("🔄 Treaty Reconcile - contract-layer build");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading configuration...");
    let config = load_config(config_path)?;
    let pipeline = ReconciliationPipeline::new(config)?;
    println!("✓ {} override/deny rules loaded", pipeline.rules().rule_count());

    println!("\n🧹 Normalizing and merging sources...");
    let output = match pipeline.run() {
        Ok(output) => output,
        Err(e) => {
            eprintln!("❌ Run aborted, no output written");
            if e.downcast_ref::<PipelineError>().map(PipelineError::is_schema_error).unwrap_or(false) {
                eprintln!("   An upstream table no longer matches its column map.");
                eprintln!("   Run: treaty-reconcile check [config.json]");
            }
            return Err(e);
        }
    };
    println!("{}", output.report.summary());

    let out = &pipeline.config().output;
    if let Some(csv_path) = &out.csv_path {
        println!("\n💾 Writing CSV...");
        let written = export_csv(&output.table, csv_path)?;
        println!("✓ {} rows → {}", written, csv_path.display());
    }

    if let Some(db_path) = &out.database_path {
        println!("\n🗄️  Storing run in SQLite...");
        let conn = Connection::open(db_path)?;
        setup_database(&conn)?;
        let inserted = insert_run(&conn, &output.report, &output.table)?;
        println!("✓ {} rows stored ({} total in database)", inserted, verify_count(&conn)?);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🎉 Run {} complete: {} rows", output.report.run_id, output.report.output_rows);

    Ok(())
}

fn check(config_path: Option<&str>) -> Result<()> {
    println!("🔍 Treaty Reconcile - source schema check");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = load_config(config_path)?;
    let pipeline = ReconciliationPipeline::new(config)?;
    let sources = SourceSet::open(&pipeline.config().sources)?;

    let checks = pipeline.check(&sources)?;
    let mut failed = 0;
    for check in &checks {
        if check.is_ok() {
            println!("✓ {}", check.table);
        } else {
            failed += 1;
            println!("❌ {} missing: {}", check.table, check.missing.join(", "));
        }
        if !check.unknown.is_empty() {
            println!("   ⚠️  unmapped: {}", check.unknown.join(", "));
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if failed == 0 {
        println!("✅ All {} tables match their column maps", checks.len());
        Ok(())
    } else {
        eprintln!("❌ {} of {} tables drifted from their column maps", failed, checks.len());
        std::process::exit(1);
    }
}
