//! Operational CLI over the matching pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::entities::patient::PatientInput;
use crate::error::MedMatchError;
use crate::matching::{MatchRequest, MatchingService, RetrievalStrategy};
use crate::search::SearchEngine;
use crate::sources::registry::{RegistryClient, RegistrySearchParams};

#[derive(Debug, Parser)]
#[command(
    name = "medmatch",
    about = "Match patients against recruiting clinical trials",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceArg {
    /// Use the in-memory hybrid index, falling back to the registry.
    Index,
    /// Query the live registry, falling back to the index.
    Registry,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Match a patient (free-text query or JSON file) against trials.
    Match {
        /// Natural-language medical query, e.g. "54 year old woman with
        /// metastatic breast cancer".
        #[arg(short, long)]
        query: Option<String>,

        /// Free-text clinical notes.
        #[arg(long)]
        notes: Option<String>,

        /// Path to a structured patient JSON payload.
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(long, default_value_t = 3)]
        max_results: usize,

        #[arg(long, default_value_t = 0.5)]
        min_confidence: f64,

        #[arg(long, value_enum, default_value_t = SourceArg::Registry)]
        source: SourceArg,

        /// Skip the detailed reasoning chain.
        #[arg(long)]
        basic_reasoning: bool,
    },

    /// Fetch and normalize one trial record by NCT id.
    Trial { nct_id: String },

    /// Search the clinical-trials registry.
    Search {
        #[arg(short, long)]
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn patient_from_args(
    query: Option<String>,
    notes: Option<String>,
    file: Option<PathBuf>,
) -> Result<PatientInput, MedMatchError> {
    if let Some(path) = file {
        let payload = std::fs::read_to_string(path)?;
        let patient: PatientInput = serde_json::from_str(&payload)?;
        return Ok(patient);
    }

    if query.is_none() && notes.is_none() {
        return Err(MedMatchError::InvalidArgument(
            "Provide --query, --notes, or --file with patient data".into(),
        ));
    }

    Ok(PatientInput {
        medical_query: query,
        clinical_notes: notes,
        ..Default::default()
    })
}

pub async fn run(cli: Cli) -> Result<String, MedMatchError> {
    match cli.command {
        Commands::Match {
            query,
            notes,
            file,
            max_results,
            min_confidence,
            source,
            basic_reasoning,
        } => {
            let patient = patient_from_args(query, notes, file)?;
            let settings = Settings::from_env()?;
            let engine = Arc::new(SearchEngine::new(settings.vector_dimension));
            let strategy = match source {
                SourceArg::Index => RetrievalStrategy::IndexedCorpus,
                SourceArg::Registry => RetrievalStrategy::LiveRegistry,
            };

            let service = MatchingService::new(&settings, engine, strategy)?;
            let response = service
                .match_trials(&MatchRequest {
                    patient,
                    max_results,
                    min_confidence,
                    enable_advanced_reasoning: !basic_reasoning,
                })
                .await?;
            crate::render::json::to_pretty(&response)
        }
        Commands::Trial { nct_id } => {
            let client = RegistryClient::new()?;
            let trial = client.get_by_nct_id(&nct_id).await?;
            crate::render::json::to_pretty(&trial)
        }
        Commands::Search { query, limit } => {
            let client = RegistryClient::new()?;
            let page = client
                .search(&RegistrySearchParams {
                    keywords: vec![query],
                    page_size: limit.clamp(1, 100),
                    ..Default::default()
                })
                .await?;
            crate::render::json::to_pretty(&page.results)
        }
    }
}
