use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use drill::config::{EngineConfig, StorageBackend};
use drill::db::Database;
use drill::engine::{RankRequest, Recommender, SampleRequest};
use drill::error::EngineError;
use drill::filter::TopicFilter;
use drill::models::{
    Difficulty, FeedbackEntry, JsonOutput, NewTopic, RecommendationSet, SortKey, SortOrder,
};
use drill::priority::PriorityCalculator;
use drill::store::{JsonFileStore, Store};

#[derive(Parser)]
#[command(name = "drill")]
#[command(about = "Spaced-repetition recommender that picks which topics to quiz you on next")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// User whose topic collection to use
    #[arg(long, global = true, env = "DRILL_USER", default_value = "default")]
    user: String,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize storage
    Init,

    /// Manage topics
    #[command(subcommand)]
    Topic(TopicCommands),

    /// List all categories
    Categories,

    /// Show per-category statistics
    Stats,

    /// Sample a priority-weighted, category-diverse set of topics
    Recommend {
        /// Number of topics to recommend
        #[arg(long, short, default_value_t = 5)]
        count: usize,

        /// Only topics added within the last N days
        #[arg(long)]
        added_within: Option<u32>,

        /// Only topics not seen within the last N days
        #[arg(long)]
        not_seen_within: Option<u32>,

        /// Only topics with at least this base score (1-100)
        #[arg(long)]
        min_score: Option<u32>,

        /// Restrict to a category (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Seed the sampler for a reproducible selection
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Pick the top or bottom topics by one attribute
    Rank {
        /// success_rate, attempt_count, base_score, last_seen or date_added
        #[arg(long)]
        by: String,

        /// top (highest first) or bottom (lowest first)
        #[arg(long, default_value = "top")]
        order: String,

        /// Number of topics to pick
        #[arg(long, short, default_value_t = 5)]
        count: usize,
    },

    /// List recommendation sets still awaiting feedback
    Sessions {
        /// Delete expired sessions first
        #[arg(long)]
        prune: bool,
    },

    /// Report how a recommendation set went
    Feedback {
        /// Session ID printed by `recommend` or `rank`
        session_id: String,

        /// One per topic as position:difficulty:solved, e.g. 2:hard:n
        #[arg(required = true)]
        entries: Vec<String>,
    },
}

#[derive(Subcommand)]
enum TopicCommands {
    /// List topics
    List {
        /// Filter by category
        #[arg(long, short)]
        category: Option<String>,

        /// name, success_rate, attempt_count, base_score, last_seen or date_added
        #[arg(long, short)]
        sort_by: Option<String>,

        /// top (highest first) or bottom (lowest first)
        #[arg(long, default_value = "bottom")]
        order: String,
    },

    /// Add a new topic
    Add {
        /// Topic name
        name: String,

        /// Topic category
        #[arg(long, short)]
        category: String,

        /// Initial difficulty, 1 (trivial) to 100 (brutal)
        #[arg(long, short, default_value_t = 50, value_parser = clap::value_parser!(u8).range(1..=100))]
        difficulty: u8,
    },

    /// Show topic details and its current priority
    Show {
        /// Topic ID
        id: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("drill=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drill=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &EngineConfig) -> Result<(Box<dyn Store>, PathBuf), Box<dyn std::error::Error>> {
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let path = config.sqlite_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let db = Database::open(&path)?;
            db.init()?;
            debug!(path = %path.display(), "opened sqlite store");
            Ok((Box::new(db), path))
        }
        StorageBackend::Json => {
            let dir = config.data_dir();
            let store = JsonFileStore::new(&dir)?;
            debug!(path = %dir.display(), "opened json store");
            Ok((Box::new(store), dir))
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            let message = match e.downcast_ref::<EngineError>() {
                Some(engine_err) => format!("{}: {}", engine_err.kind(), engine_err),
                None => e.to_string(),
            };
            if let Ok(out) = serde_json::to_string(&JsonOutput::<()>::err(message)) {
                println!("{}", out);
            }
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load()?;
    let (store, location) = open_store(&config)?;
    let now = Utc::now();
    let user = cli.user.as_str();

    match cli.command {
        Commands::Init => {
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("Storage initialized at: {}", location.display());
            }
        }

        Commands::Topic(topic_cmd) => {
            let mut engine = Recommender::new(&config, store);
            match topic_cmd {
                TopicCommands::List {
                    category,
                    sort_by,
                    order,
                } => {
                    let sort_by = sort_by.as_deref().map(parse_sort_key).transpose()?;
                    let order = parse_sort_order(&order)?;
                    let topics = engine.list_topics(user, sort_by, order, category.as_deref())?;

                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::ok(&topics))?);
                    } else if topics.is_empty() {
                        println!("No topics found.");
                    } else {
                        println!(
                            "{:<6} {:<32} {:<16} {:>6} {:>9} LAST SEEN",
                            "ID", "NAME", "CATEGORY", "BASE", "SOLVED"
                        );
                        println!("{}", "-".repeat(86));
                        for topic in topics {
                            println!(
                                "{:<6} {:<32} {:<16} {:>6.1} {:>9} {}",
                                topic.id,
                                truncate(&topic.name, 30),
                                truncate(&topic.category, 14),
                                topic.base_score,
                                format!("{}/{}", topic.successes, topic.attempts),
                                topic
                                    .last_seen
                                    .map(|t| t.format("%Y-%m-%d").to_string())
                                    .unwrap_or_else(|| "never".to_string())
                            );
                        }
                    }
                }

                TopicCommands::Add {
                    name,
                    category,
                    difficulty,
                } => {
                    let topic = engine.add_topic(
                        user,
                        NewTopic {
                            name,
                            category,
                            base_score: difficulty as f64,
                        },
                        now,
                    )?;

                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::ok(&topic))?);
                    } else {
                        println!(
                            "Added topic '{}' (ID: {}) with initial difficulty {}/100.",
                            topic.name, topic.id, difficulty
                        );
                    }
                }

                TopicCommands::Show { id } => {
                    let topic = engine.get_topic(user, &id)?;
                    let (_, breakdown) = PriorityCalculator::new(config.priority).score(&topic, now);

                    if cli.json {
                        println!(
                            "{}",
                            serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                                "topic": topic,
                                "rec_score_avg": topic.rec_score_avg(),
                                "priority_breakdown": breakdown
                            })))?
                        );
                    } else {
                        println!("Topic: {}", topic.name);
                        println!("ID: {}", topic.id);
                        println!("Category: {}", topic.category);
                        println!("Base score: {:.1}/100", topic.base_score);
                        println!("Added: {}", topic.date_added.format("%Y-%m-%d %H:%M"));
                        match topic.last_seen {
                            Some(seen) => println!("Last seen: {}", seen.format("%Y-%m-%d %H:%M")),
                            None => println!("Last seen: never"),
                        }
                        println!(
                            "Attempts: {} ({:.0}% solved)",
                            topic.attempts,
                            topic.success_rate()
                        );
                        println!("Avg rated difficulty: {:.1}", topic.rec_score_avg());
                        println!();
                        println!("--- Priority ---");
                        println!("Struggle: {:.3}", breakdown.struggle_index);
                        println!(
                            "Due: {:.3} ({:.1} of {:.1} days)",
                            breakdown.due_norm, breakdown.days_since_seen, breakdown.desired_interval
                        );
                        println!("Difficulty: {:.3}", breakdown.base_norm);
                        println!("Novelty: {:.3}", breakdown.novelty);
                        println!("Priority: {:.4}", breakdown.priority);
                    }
                }
            }
        }

        Commands::Categories => {
            let engine = Recommender::new(&config, store);
            let categories = engine.categories(user)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&categories))?);
            } else if categories.is_empty() {
                println!("No categories found.");
            } else {
                for category in categories {
                    println!("{}", category);
                }
            }
        }

        Commands::Stats => {
            let engine = Recommender::new(&config, store);
            let stats = engine.stats(user)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&stats))?);
            } else {
                println!("=== Statistics ===");
                println!("Total topics: {}", stats.total_topics);
                println!(
                    "Attempts: {} ({:.0}% solved)",
                    stats.total_attempts, stats.success_rate
                );
                if !stats.categories.is_empty() {
                    println!();
                    println!(
                        "{:<20} {:>6} {:>9} {:>9} {:>8}",
                        "CATEGORY", "TOPICS", "ATTEMPTS", "AVG BASE", "SOLVED"
                    );
                    println!("{}", "-".repeat(56));
                    for (name, cat) in &stats.categories {
                        println!(
                            "{:<20} {:>6} {:>9} {:>9.1} {:>7.0}%",
                            truncate(name, 18),
                            cat.count,
                            cat.attempts,
                            cat.avg_base_score,
                            cat.success_rate
                        );
                    }
                }
            }
        }

        Commands::Recommend {
            count,
            added_within,
            not_seen_within,
            min_score,
            categories,
            seed,
        } => {
            let mut engine = match seed {
                Some(seed) => Recommender::seeded(&config, store, seed),
                None => Recommender::new(&config, store),
            };
            let request = SampleRequest {
                user_id: user.to_string(),
                count,
                filter: TopicFilter {
                    added_within_days: added_within,
                    not_seen_within_days: not_seen_within,
                    min_base_score: min_score,
                    categories: if categories.is_empty() {
                        None
                    } else {
                        Some(categories)
                    },
                },
            };
            let set = engine.recommend(&request, now)?;
            print_recommendations(&set, cli.json)?;
        }

        Commands::Rank { by, order, count } => {
            let mut engine = Recommender::new(&config, store);
            let request = RankRequest {
                user_id: user.to_string(),
                count,
                sort_by: parse_sort_key(&by)?,
                order: parse_sort_order(&order)?,
            };
            let set = engine.rank(&request, now)?;
            print_recommendations(&set, cli.json)?;
        }

        Commands::Sessions { prune } => {
            let engine = Recommender::new(&config, store);
            if prune {
                let pruned = engine.prune_sessions(user, now)?;
                if !cli.json {
                    println!("Pruned {} expired session(s).", pruned);
                }
            }
            let sessions = engine.open_sessions(user, now)?;

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&sessions))?);
            } else if sessions.is_empty() {
                println!("No open sessions.");
            } else {
                println!("{:<38} {:<17} {:>6} TOPICS", "SESSION", "CREATED", "COUNT");
                println!("{}", "-".repeat(80));
                for session in sessions {
                    let topic_ids: Vec<&str> =
                        session.entries.iter().map(|e| e.topic_id.as_str()).collect();
                    println!(
                        "{:<38} {:<17} {:>6} {}",
                        session.session_id,
                        session.created_at.format("%Y-%m-%d %H:%M").to_string(),
                        session.entries.len(),
                        truncate(&topic_ids.join(","), 30)
                    );
                }
            }
        }

        Commands::Feedback {
            session_id,
            entries,
        } => {
            let entries = entries
                .iter()
                .map(|raw| parse_feedback_entry(raw))
                .collect::<Result<Vec<_>, _>>()?;

            let mut engine = Recommender::new(&config, store);
            let summary = engine.resolve_feedback(&session_id, &entries, now)?;

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&summary))?);
            } else {
                println!("{}", summary.message());
            }
        }
    }

    Ok(())
}

fn print_recommendations(
    set: &RecommendationSet,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string(&JsonOutput::ok(set))?);
        return Ok(());
    }

    println!(
        "{:<4} {:<6} {:<32} {:<16} {:>6} {:>8}",
        "POS", "ID", "NAME", "CATEGORY", "BASE", "PRIORITY"
    );
    println!("{}", "-".repeat(77));
    for rec in &set.recommendations {
        println!(
            "{:<4} {:<6} {:<32} {:<16} {:>6.1} {:>8.4}",
            rec.position,
            rec.topic_id,
            truncate(&rec.topic_name, 30),
            truncate(&rec.category, 14),
            rec.base_score,
            rec.priority
        );
    }
    println!();
    println!("Session: {}", set.session_id);
    println!("After the quiz, record how it went with:");
    println!(
        "  drill feedback {} <position:easy|medium|hard:y|n>...",
        set.session_id
    );
    Ok(())
}

fn parse_sort_key(s: &str) -> Result<SortKey, String> {
    SortKey::from_str(s).ok_or_else(|| {
        format!(
            "Invalid sort key '{}'. Use: name, success_rate, attempt_count, base_score, last_seen, or date_added",
            s
        )
    })
}

fn parse_sort_order(s: &str) -> Result<SortOrder, String> {
    SortOrder::from_str(s)
        .ok_or_else(|| format!("Invalid order '{}'. Use: top or bottom", s))
}

/// Parses `position:difficulty:solved`, e.g. `2:hard:n`.
fn parse_feedback_entry(s: &str) -> Result<FeedbackEntry, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [position, difficulty, solved] = parts.as_slice() else {
        return Err(format!(
            "Invalid feedback '{}'. Expected position:difficulty:solved, e.g. 2:hard:n",
            s
        ));
    };

    let position: usize = position
        .trim()
        .parse()
        .map_err(|_| format!("Invalid position '{}' in '{}'", position, s))?;
    let difficulty = parse_difficulty(difficulty).ok_or_else(|| {
        format!(
            "Invalid difficulty '{}'. Use: easy, medium, or hard",
            difficulty
        )
    })?;
    let solved = match solved.trim().to_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => true,
        "n" | "no" | "false" | "0" => false,
        other => return Err(format!("Invalid solved flag '{}'. Use: y or n", other)),
    };

    Ok(FeedbackEntry::new(position, difficulty, solved))
}

/// Full difficulty names plus the `e`/`m`/`h` shorthands.
fn parse_difficulty(s: &str) -> Option<Difficulty> {
    match s.trim().to_lowercase().as_str() {
        "e" => Some(Difficulty::Easy),
        "m" => Some(Difficulty::Medium),
        "h" => Some(Difficulty::Hard),
        other => Difficulty::from_str(other),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
