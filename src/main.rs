use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracker_provisioner::adapters::pump_lines;
use tracker_provisioner::utils::error::{ErrorSeverity, ProvisionError};
use tracker_provisioner::utils::{logger, validation::Validate};
use tracker_provisioner::{
    ApiClient, CliArgs, Command, CommandCatalog, InboundHub, ProvisionerConfig, Provisioner,
    TrackerDetails,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let config = match ProvisionerConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(args.verbose);
            exit_with(&e);
        }
    };

    // 初始化日誌
    let verbose = args.verbose || config.verbose_logging();
    if config.json_logging() {
        logger::init_json_logger(verbose);
    } else {
        logger::init_cli_logger(verbose);
    }
    tracing::info!("Starting tracker-provisioner CLI");

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }

    let api = config.api_client().context("failed to build API client")?;

    match args.command {
        Command::Whoami => {
            let name = api.whoami().await.unwrap_or_else(|e| {
                tracing::warn!("⚠️ whoami failed: {}", e);
                "Unknown".to_string()
            });
            println!("👤 Logged in as {}", name);
        }
        Command::Models => {
            let catalog = load_catalog(&api, &config).await;
            if catalog.is_empty() {
                println!("No tracker models available");
            }
            for name in catalog.model_names() {
                println!("📟 {}", name);
            }
        }
        Command::Provision {
            id,
            name,
            phone,
            model,
            confirm_connectivity,
            no_wait_for_ack,
        } => {
            let details = match TrackerDetails::new(&id, &name, &phone, &model) {
                Ok(details) => details,
                Err(e) => exit_with(&e),
            };

            let sms = config.sms_gateway().context("failed to build SMS gateway")?;
            let catalog = load_catalog(&api, &config).await;

            let mut settings = config.to_settings();
            if no_wait_for_ack {
                settings.wait_for_ack = false;
            }

            // stdin 上的收訊轉發到 hub
            let inbox = InboundHub::new();
            let feed = inbox.clone();
            tokio::spawn(async move {
                let stdin = BufReader::new(tokio::io::stdin());
                match pump_lines(stdin, &feed).await {
                    Ok(count) => tracing::debug!("Inbound feed closed after {} messages", count),
                    Err(e) => tracing::warn!("⚠️ Inbound feed failed: {}", e),
                }
            });

            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<tracker_provisioner::core::orchestrator::ProgressEvent>();
            let printer = tokio::spawn(async move {
                while let Some(event) = progress_rx.recv().await {
                    println!("⏳ {}", event.describe());
                }
            });

            let provisioner = Provisioner::new(Arc::new(api), Arc::new(sms), inbox, catalog)
                .with_settings(settings)
                .with_progress(progress_tx);
            let handle = provisioner.provision(details, confirm_connectivity);
            drop(provisioner);

            let outcome = tokio::select! {
                outcome = handle.outcome() => outcome,
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("🛑 Interrupted, abandoning provisioning");
                    std::process::exit(130);
                }
            };
            let _ = printer.await;

            match outcome {
                Ok(report) => {
                    println!("✅ Tracker {} provisioned", report.tracker_id);
                    println!("📝 Registration: {}", report.registration.describe());
                    println!(
                        "📨 Commands sent: {} (acknowledged: {})",
                        report.commands_sent, report.acknowledged
                    );
                    if report.connectivity_confirmed {
                        println!("🛰️ Tracker is connected");
                    }
                    println!("⏱️ Took {:.1}s", report.elapsed.as_secs_f64());
                }
                Err(failure) => {
                    tracing::error!(
                        "❌ Provisioning failed at {} stage: {} (Category: {:?}, Severity: {:?})",
                        failure.stage,
                        failure.error,
                        failure.error.category(),
                        failure.severity()
                    );
                    if failure.is_retriable() {
                        eprintln!("🔄 This failure is temporary, running again may succeed");
                    }
                    exit_with(&failure.error);
                }
            }
        }
    }

    Ok(())
}

/// 後端型號清單加上本地覆寫；後端不可用時只用本地清單
async fn load_catalog(api: &ApiClient, config: &ProvisionerConfig) -> CommandCatalog {
    let mut catalog = match CommandCatalog::fetch(api).await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::warn!("⚠️ Could not fetch tracker models: {}", e);
            CommandCatalog::new()
        }
    };
    match config.local_catalog() {
        Ok(local) => catalog.merge(local),
        Err(e) => tracing::warn!("⚠️ Ignoring local models: {}", e),
    }
    catalog
}

fn exit_with(e: &ProvisionError) -> ! {
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 4,      // 輸入錯誤
        ErrorSeverity::Medium => 2,   // 可重試
        ErrorSeverity::High => 1,     // 佈建失敗
        ErrorSeverity::Critical => 3, // 系統錯誤
    };
    std::process::exit(exit_code);
}
