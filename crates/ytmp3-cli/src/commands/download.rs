use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::process::ExitCode;
use std::time::Duration;
use tokio::{fs, signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::args::DownloadOptions;
use ytmp3_core::{
    batch::{run_batch, BatchReport},
    config::{DownloadConfig, Settings, ToolPaths},
    pipeline::{Pipeline, PipelineStage},
};

pub async fn run(options: &DownloadOptions, settings: &Settings) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let report = download(options, settings, &cancel).await?;
    print_summary(&report);

    // Per-URL failures and interruptions do not change the exit status
    Ok(ExitCode::SUCCESS)
}

/// Validate, resolve tools and run the batch until done or `cancel` fires
async fn download(
    options: &DownloadOptions,
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<BatchReport> {
    let input_content = match &options.input {
        Some(path) => Some(
            fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read input file {}", path.display()))?,
        ),
        None => None,
    };

    let config = DownloadConfig::new(settings, options.collect_urls(input_content.as_deref()))?;
    let tools = ToolPaths::resolve(settings)?;
    debug!("yt-dlp: {}", tools.yt_dlp.display());
    debug!("ffmpeg: {}", tools.ffmpeg.display());

    config
        .create_dirs()
        .await
        .context("Failed to create output directory")?;

    let total_urls = config.urls().len();
    println!(
        "Processing {} URLs ({}) into {}\n",
        total_urls,
        config.audio(),
        config.output_dir().display()
    );

    let pipeline = Pipeline::new(config, tools);
    let multi = MultiProgress::new();
    let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {msg}")?.tick_chars("=>-");

    let pipeline = &pipeline;
    let multi = &multi;
    let spinner_style = &spinner_style;

    let report = run_batch(
        pipeline.config().urls(),
        pipeline.config().max_concurrent_downloads(),
        cancel,
        move |idx, url| {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(spinner_style.clone());

            async move {
                let prefix = format!("[{}/{}]", idx + 1, total_urls);
                pb.set_message(format!("{} {}", prefix, truncate(&url, 50)));
                pb.enable_steady_tick(Duration::from_millis(100));

                let (tx, mut rx) = mpsc::channel(16);
                let progress_handle = {
                    let pb = pb.clone();
                    let prefix = prefix.clone();
                    tokio::spawn(async move {
                        while let Some(stage) = rx.recv().await {
                            match stage {
                                PipelineStage::Complete { .. } | PipelineStage::Failed { .. } => {}
                                stage => pb.set_message(format!("{} {}", prefix, stage)),
                            }
                        }
                    })
                };

                let result = pipeline.run(&url, cancel, tx).await;
                let _ = progress_handle.await;

                match &result {
                    Ok(path) => pb.finish_with_message(format!(
                        "{} Done: {}",
                        prefix,
                        path.file_name().unwrap_or_default().to_string_lossy()
                    )),
                    Err(e) if e.is_cancelled() => {
                        pb.abandon_with_message(format!("{} Cancelled", prefix))
                    }
                    Err(e) => pb.abandon_with_message(format!("{} Failed: {}", prefix, e)),
                }

                result
            }
        },
    )
    .await?;

    Ok(report)
}

fn print_summary(report: &BatchReport) {
    println!("\n=== Batch Complete ===");
    println!("Succeeded: {}", report.succeeded());
    println!("Failed: {}", report.failed());
    if report.cancelled() > 0 {
        println!("Cancelled: {}", report.cancelled());
    }

    if report.failed() > 0 {
        println!("\nFailed URLs:");
        for (url, e) in report.failures() {
            println!("  {} - {}", url, e);
        }
    }
}

/// Cancel `cancel` on Ctrl+C (or SIGTERM on unix)
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    warn!("Interrupted, stopping running downloads");
    cancel.cancel();
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
