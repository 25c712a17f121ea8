use anyhow::Context;
use clap::Parser;
use collision_triage::domain::ports::StageReporter;
use collision_triage::utils::error::{AssessmentError, ErrorSeverity};
use collision_triage::utils::{logger, validation::Validate};
use collision_triage::{
    AppConfig, AssessmentEngine, AssessmentSettings, CliConfig, ConsoleReporter, LocalStorage,
    OpenAiGateway, Services, SessionInput, TracingReporter, VehicleDataGateway,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliConfig::parse();

    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting collision-triage");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match AppConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(exit_code(&e));
        }
    };
    if let Some(output) = &args.output {
        config.output.directory = output.clone();
    }

    if let Err(e) = args.validate().and_then(|_| config.validate()) {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(exit_code(&e));
    }

    let session = match args.load_session() {
        Ok(session) => session,
        Err(e) => fail(e),
    };

    display_summary(&config, &session, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No service will be called");
        if let Err(e) = perform_dry_run(&config, &session) {
            fail(e);
        }
        return Ok(());
    }

    let reporter: Arc<dyn StageReporter> = if args.log_json {
        Arc::new(TracingReporter)
    } else {
        Arc::new(ConsoleReporter)
    };
    let engine = match build_engine(&config, reporter) {
        Ok(engine) => engine,
        Err(e) => fail(e),
    };

    match engine.run(session).await {
        Ok(report) => {
            let storage = LocalStorage::new(&config.output.directory);
            let written = report
                .persist(&storage, config.output.write_job_card)
                .await
                .context("failed to write the assessment report")?;

            tracing::info!("✅ Assessment {} completed", report.session_id);
            println!("✅ Assessment completed successfully!");
            for path in written {
                println!("📁 Output saved to: {}", storage.resolve(&path).display());
            }
            if !report.notices.is_empty() {
                println!("⚠️ {} result(s) could not be decoded, see the report", report.notices.len());
            }
        }
        Err(e) => fail(e),
    }

    Ok(())
}

fn build_engine(
    config: &AppConfig,
    reporter: Arc<dyn StageReporter>,
) -> collision_triage::Result<AssessmentEngine> {
    let services = Services {
        inference: Arc::new(OpenAiGateway::from_config(&config.inference)?),
        vehicles: Arc::new(VehicleDataGateway::from_config(&config.vehicle_data)?),
        prompts: config.load_prompts()?,
        cost_model: config.build_cost_model()?,
        reference_images: config.load_reference_images()?,
        settings: AssessmentSettings::from_config(config),
    };
    Ok(AssessmentEngine::new(Arc::new(services), reporter))
}

fn exit_code(e: &AssessmentError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn fail(e: AssessmentError) -> ! {
    tracing::error!(
        "❌ Assessment failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
    std::process::exit(exit_code(&e));
}

fn display_summary(config: &AppConfig, session: &SessionInput, args: &CliConfig) {
    println!("📋 Assessment Summary:");
    println!("  Service: {} v{}", config.service.name, config.service.version);
    println!("  Registration: {}", session.registration);
    println!("  Images: {}", session.images.len());
    println!("  Vision model: {}", config.inference.vision_model);
    println!("  Output: {}", config.output.directory);

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &AppConfig, session: &SessionInput) -> collision_triage::Result<()> {
    session.validate()?;
    let prompts = config.load_prompts()?;
    let cost_model = config.build_cost_model()?;
    let references = config.load_reference_images()?;

    println!("🔍 Dry Run Analysis:");
    println!();
    println!("📡 Services:");
    println!("  Inference: {}", config.inference.api_base);
    println!("  Vehicle data: {}", config.vehicle_data.base_url);
    println!();
    println!("📝 Prompts: version {}", prompts.version());
    println!(
        "💷 Cost table: {} parts, threshold £{:.2}",
        cost_model.base_costs().len(),
        config.cost_model.base_threshold
    );
    println!("🖼️ Reference images: {}", references.len());
    for image in &session.images {
        println!("  {} ({}, {} bytes)", image.name, image.mime_type, image.bytes.len());
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");
    Ok(())
}
