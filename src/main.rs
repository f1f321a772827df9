use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use insightflow::models::{
    AnalysisJob, DatasetKind, FillStrategy, FredMergeConfig, InsightResult, QuickTrainConfig,
    UploadFile,
};
use insightflow::utils::init_logger;
use insightflow::workflow::WorkspaceState;
use insightflow::{Config, HttpGateway, Notification, NotificationLevel, Workspace};

#[derive(Parser)]
#[command(name = "insightflow", version, about = "Drive an analysis workspace from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the dataset catalog
    Datasets {
        #[arg(long)]
        kind: Option<DatasetKind>,
    },
    /// Select a dataset and show its preview and metadata
    Explore { id: String },
    /// Upload a file as a new dataset
    Upload {
        path: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Select the new dataset once uploaded
        #[arg(long)]
        select: bool,
    },
    Delete { id: String },
    /// Create an analysis tool for a dataset
    Analyze {
        dataset: String,
        #[arg(long)]
        intent: String,
        #[arg(long)]
        model: Option<String>,
        /// Wait until the analysis finishes
        #[arg(long)]
        wait: bool,
    },
    /// Configure and start training an analyzed tool
    Train {
        tool: String,
        #[arg(long)]
        target: String,
        #[arg(long, value_delimiter = ',', required = true)]
        features: Vec<String>,
        #[arg(long, default_value_t = 0.8)]
        split: f64,
        #[arg(long, default_value_t = 0)]
        approach: usize,
        #[arg(long)]
        temporal: Option<String>,
    },
    /// Merge FRED economic series into a dataset
    MergeFred {
        dataset: String,
        #[arg(long, value_delimiter = ',', required = true)]
        series: Vec<String>,
        #[arg(long)]
        date_column: String,
        #[arg(long, default_value = "ffill")]
        fill: FillStrategy,
    },
    /// Cross-dataset insights for two or more datasets
    Compare {
        #[arg(num_args = 2.., required = true)]
        ids: Vec<String>,
        #[arg(long)]
        intent: Option<String>,
    },
    Insights {
        dataset: String,
        #[arg(long)]
        intent: Option<String>,
    },
    /// Stay mounted and print job notifications
    Watch {
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    let _guard = init_logger(&config.logging);
    info!("Using analysis service at {}", config.gateway.base_url);

    let gateway = Arc::new(HttpGateway::new(&config.gateway)?);
    let (workspace, notifications) = Workspace::mount(&config, gateway);
    let printer = tokio::spawn(print_notifications(notifications));

    let outcome = run(&workspace, cli.command).await;

    workspace.unmount().await;
    // The channel closes once the store and poller are gone
    let _ = printer.await;
    outcome
}

async fn run(workspace: &Workspace, command: Command) -> anyhow::Result<()> {
    let store = workspace.store();
    store.refresh_datasets().await?;

    match command {
        Command::Datasets { kind } => {
            let state = store.snapshot().await;
            let datasets = match kind {
                Some(kind) => state.datasets_of_kind(kind),
                None => state.datasets.iter().collect(),
            };
            if datasets.is_empty() {
                println!("No datasets");
            }
            for d in datasets {
                println!(
                    "{:<24} {:<32} {:>5} {:>8} rows {:>4} cols",
                    d.id, d.name, d.kind, d.row_count, d.column_count
                );
            }
        }
        Command::Explore { id } => {
            store.select_dataset(&id).await?;
            print_explore(&store.snapshot().await);
        }
        Command::Upload {
            path,
            name,
            description,
            select,
        } => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone());
            let dataset = store
                .upload_dataset(UploadFile::new(filename, data), &name, description.as_deref())
                .await?;
            println!("Uploaded {} as {}", dataset.name, dataset.id);
            if select {
                store.select_dataset(&dataset.id).await?;
                print_explore(&store.snapshot().await);
            }
        }
        Command::Delete { id } => {
            store.delete_dataset(&id).await?;
            println!("Deleted {}", id);
        }
        Command::Analyze {
            dataset,
            intent,
            model,
            wait,
        } => {
            store.select_dataset(&dataset).await?;
            let job = workspace.run_analysis(&intent, model.as_deref()).await?;
            println!("Created analysis {} ({})", job.id, job.status);
            if wait {
                let mut jobs = workspace.poller().subscribe();
                jobs.wait_for(|jobs| {
                    jobs.iter()
                        .any(|j| j.id == job.id && !j.status.is_in_progress())
                })
                .await
                .context("Job poller stopped")?;
                workspace.sync_active_tool().await?;
                if let Some(tool) = store.snapshot().await.active_tool {
                    print_analysis(&tool);
                }
            }
        }
        Command::Train {
            tool,
            target,
            features,
            split,
            approach,
            temporal,
        } => {
            store.select_tool(&tool).await?;
            let job = workspace
                .quick_train(QuickTrainConfig {
                    approach_index: approach,
                    target_column: target,
                    feature_columns: features,
                    split_ratio: split,
                    temporal_column: temporal,
                })
                .await?;
            println!("{} is {}", job.name, job.status);
        }
        Command::MergeFred {
            dataset,
            series,
            date_column,
            fill,
        } => {
            store.select_dataset(&dataset).await?;
            store
                .merge_fred(FredMergeConfig {
                    series_ids: series,
                    date_column,
                    fill_strategy: fill,
                })
                .await?;
            print_explore(&store.snapshot().await);
        }
        Command::Compare { ids, intent } => {
            for id in &ids {
                if !store.toggle_compare_dataset(id).await? {
                    bail!("Dataset {} could not be added to the comparison", id);
                }
            }
            let result = store.fetch_multi_dataset_insights(intent.as_deref(), None).await?;
            print_insights(&result);
        }
        Command::Insights { dataset, intent } => {
            store.select_dataset(&dataset).await?;
            let result = store.fetch_data_insights(intent.as_deref(), None).await?;
            print_insights(&result);
        }
        Command::Watch { seconds } => {
            workspace.poller().refresh();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }
    Ok(())
}

async fn print_notifications(mut rx: mpsc::Receiver<Notification>) {
    while let Some(n) = rx.recv().await {
        let marker = match n.level {
            NotificationLevel::Info => "•",
            NotificationLevel::Success => "✓",
            NotificationLevel::Error => "✗",
        };
        eprintln!("{} {}: {}", marker, n.title, n.message);
    }
}

fn print_explore(state: &WorkspaceState) {
    let Some(dataset) = &state.active_dataset else {
        return;
    };
    println!("{} ({}), {} rows", dataset.name, dataset.id, dataset.row_count);
    if let Some(score) = state.metadata.as_ref().and_then(|m| m.quality_score) {
        println!("Quality score: {:.2}", score);
    }
    println!("{}", state.preview_columns.join(" | "));
    for row in &state.preview_rows {
        let cells: Vec<String> = state
            .preview_columns
            .iter()
            .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        println!("{}", cells.join(" | "));
    }
    if let Some(insights) = &state.data_insights {
        print_insights(insights);
    }
}

fn print_analysis(tool: &AnalysisJob) {
    println!("{} is {}", tool.name, tool.status);
    let Some(analysis) = &tool.analysis else {
        return;
    };
    println!(
        "Feasible: {}{}",
        analysis.feasibility.feasible,
        analysis
            .feasibility
            .reason
            .as_deref()
            .map(|r| format!(" ({r})"))
            .unwrap_or_default()
    );
    for (i, approach) in analysis.approaches.iter().enumerate() {
        println!("  [{}] {} {}", i, approach.name, approach.description);
    }
}

fn print_insights(result: &InsightResult) {
    if result.cached {
        println!("(cached)");
    }
    println!("{}", result.summary);
    for insight in &result.insights {
        println!("- {} {}", insight.title, insight.detail);
    }
    for recommendation in &result.recommendations {
        println!("> {}", recommendation);
    }
}
