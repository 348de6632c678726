//! reverie-demo — one persona, a few simulated ticks.
//!
//! Usage: `reverie-demo [config.toml] [save-dir]`
//!
//! Without a configured provider the persona thinks with keyword rules and
//! bag-of-words vectors; with one, ratings and conversation notes come from
//! the chat model and vectors from the embedding model.
//!
//! Each tick the persona perceives its surroundings, recalls related
//! memories, and reflects when its trigger fires. At the end it answers a
//! focal-point query and saves itself as JSON and SQLite.

mod chat;
mod heuristic;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use reverie_core::cognition::{Cognition, Collaborators};
use reverie_core::config::ReverieConfig;
use reverie_core::embedding::{BagOfWordsEmbeddingProvider, EmbeddingProvider};
use reverie_core::memory::MemoryStore;
use reverie_core::observation::{ChatContext, PerceivedEvent, Perception, observe};
use reverie_core::persistence::{JsonRepository, PersistenceEngine, PersonaSnapshot};
use reverie_core::reflection::{Conversation, ReflectionCounters, ReflectionRequest, Reflector};
use reverie_core::retrieval::Retriever;
use reverie_core::types::{SimTime, Triple, format_sim_time};
use reverie_llm::{BlockingEmbedder, CostTracker, LlmService};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::chat::ChatCognition;
use crate::heuristic::RuleBasedCognition;

const PERSONA: &str = "Klaus Mueller";
const PARTNER: &str = "Maria Lopez";

fn init_logging(config: &ReverieConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.general.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// What the persona sees on each tick.
fn scene(tick: i64) -> Vec<PerceivedEvent> {
    let library = "the Ville:Oak Hill College:library";
    let mut events = vec![
        PerceivedEvent::new(
            format!("{library}:{PERSONA}"),
            "is",
            format!("{library}:desk"),
            match tick {
                0 => "reading about gentrification (reading research papers)",
                1 => "outlining the research paper (writing)",
                2 => "annoyed by the deadline (worrying about the deadline)",
                _ => "talking with Maria (chatting)",
            },
        ),
        PerceivedEvent::idle(format!("{library}:bookshelf")),
    ];
    if tick >= 2 {
        events.push(PerceivedEvent::new(
            format!("{library}:{PARTNER}"),
            "is",
            format!("{library}:table"),
            "planning the Valentine's party (planning a party)",
        ));
    }
    if tick == 3 {
        events.push(PerceivedEvent::new(PERSONA, "chat with", PARTNER, "chatting about the party"));
    }
    events
}

fn start_time() -> Result<SimTime> {
    NaiveDate::from_ymd_opt(2023, 2, 13)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .context("invalid start time")
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => ReverieConfig::from_file(std::path::Path::new(&path))
            .with_context(|| format!("loading config from {path}"))?,
        None => ReverieConfig::default(),
    };
    let save_dir = PathBuf::from(args.next().unwrap_or_else(|| "reverie-save".to_string()));
    init_logging(&config);

    let costs = Arc::new(CostTracker::new());
    let (embedder, cognition): (Box<dyn EmbeddingProvider>, Box<dyn Cognition>) = if config.llm.provider == "none" {
        (Box::new(BagOfWordsEmbeddingProvider::default()), Box::new(RuleBasedCognition))
    } else {
        let embedder = BlockingEmbedder::from_config(&config.llm, Arc::clone(&costs)).context("building embedder")?;
        let service = LlmService::from_config(&config.llm, Arc::clone(&costs)).context("building chat service")?;
        let cognition = ChatCognition::from_config(&config.llm, service).context("building chat cognition")?;
        (Box::new(embedder), Box::new(cognition))
    };
    info!(
        provider = %config.llm.provider,
        model = embedder.model_name(),
        strategy = ?config.retrieval.strategy,
        "Demo starting"
    );

    let services = Collaborators::new(cognition.as_ref(), embedder.as_ref());
    let retriever = Retriever::from_config(&config.retrieval);
    let reflector = Reflector::from_config(&config.reflection, config.retrieval.top_n);
    let mut store = MemoryStore::new();
    let mut counters = ReflectionCounters::new(config.reflection.importance_trigger_max);

    let start = start_time()?;
    let chat = ChatContext {
        triple: Triple::new(PERSONA, "chat with", PARTNER),
        description: "chatting about the party".to_string(),
    };
    let conversation = Conversation {
        partner: PARTNER.to_string(),
        end_time: start + Duration::minutes(30) + Duration::seconds(config.reflection.conversation_lookahead_secs),
        lines: vec![
            (PARTNER.to_string(), "Are you coming to Isabella's party?".to_string()),
            (PERSONA.to_string(), "Only if I finish my paper first.".to_string()),
        ],
    };

    for tick in 0..4 {
        let now = start + Duration::minutes(10 * tick);
        let in_chat = tick == 3;
        let perception = Perception {
            persona: PERSONA,
            now,
            retention: config.perception.retention,
            chat: in_chat.then_some(&chat),
        };
        let ids = observe(&perception, &scene(tick), &mut store, &mut counters, services)?;

        for (description, hit) in retriever.retrieve(&ids, &store)? {
            println!(
                "[{}] {description}: {} related events, {} related thoughts",
                format_sim_time(&now),
                hit.events.len(),
                hit.thoughts.len()
            );
        }

        let outcome = reflector.reflect(
            &ReflectionRequest {
                persona: PERSONA,
                now,
                conversation: in_chat.then_some(&conversation),
            },
            &mut store,
            &mut counters,
            &retriever,
            services,
        );
        for id in &outcome.new_thoughts {
            if let Some(thought) = store.get(*id) {
                println!("    thought {id}: {}", thought.description);
            }
        }
    }

    let focal = vec![format!("What is {PERSONA} working on?")];
    let now = start + Duration::hours(1);
    for hit in retriever.retrieve_by_focal_points(&focal, &mut store, embedder.as_ref(), now, 5) {
        println!("\n{}", hit.focal_point);
        for ranked in hit.records {
            println!("  {:.3}  {}", ranked.score, ranked.record.description);
        }
    }

    let persona_dir = save_dir.join(PERSONA);
    JsonRepository::new(&persona_dir)
        .save(&store.get_state())
        .with_context(|| format!("saving to {}", persona_dir.display()))?;
    let engine = PersistenceEngine::open(save_dir.join("reverie.db"), &config.persistence).context("opening database")?;
    engine
        .save(PERSONA, &PersonaSnapshot::capture(&store, &counters))
        .context("saving snapshot")?;
    info!(records = store.len(), dir = %save_dir.display(), "Persona saved");

    let report = costs.report();
    if report.total_tokens > 0 {
        println!("\nLLM usage: {} tokens, ${:.4}", report.total_tokens, report.total_cost);
    }
    Ok(())
}
