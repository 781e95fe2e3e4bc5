//! # codepal CLI
//!
//! Play the coding tutor in a terminal.
//!
//! Usage:
//!   codepal play [--level N] [--locale en|es]
//!   codepal levels
//!   codepal render <visual.json> [-o out.svg]
//!   codepal suggest <buffer> [--caret N]
//!
//! Examples:
//!   CODEPAL_API_KEY=... codepal play
//!   CODEPAL_BASE_URL=http://localhost:11434/v1 codepal play --level 1
//!   codepal suggest "screen.ci"

mod play;
mod telemetry;

use anyhow::Context;
use clap::{Parser, Subcommand};
use codepal_core::provider::{ENV_BASE_URL, ENV_MODEL};
use codepal_core::{render, Curriculum, ModelAdapter, Progress, ProviderConfig, VisualState};
use codepal_tutor::{Locale, Tutor, TutorConfig};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "codepal")]
#[command(author, version, about = "codepal - a friendly robot that teaches kids to code")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Course file (JSON); the built-in course is used when absent
    #[arg(long, global = true, env = "CODEPAL_COURSE")]
    course: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the tutor and play a level
    Play {
        /// Level to start on (otherwise the menu is shown)
        #[arg(short, long)]
        level: Option<u32>,

        /// Language the tutor speaks (en or es)
        #[arg(long, env = "CODEPAL_LOCALE", default_value = "en")]
        locale: Locale,

        /// Model id
        #[arg(long, env = "CODEPAL_MODEL")]
        model: Option<String>,

        /// OpenAI-compatible base address (selects the compatibility format)
        #[arg(long, env = "CODEPAL_BASE_URL")]
        base_url: Option<String>,
    },
    /// List the course levels
    Levels,
    /// Render a saved visual state (JSON array of batches) to SVG
    Render {
        /// Path to the visual state JSON file
        file: PathBuf,

        /// Write the SVG here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show code completions for a buffer
    Suggest {
        /// The code buffer
        buffer: String,

        /// Caret byte offset (default: end of buffer)
        #[arg(long)]
        caret: Option<usize>,
    },
}

fn load_course(path: Option<&Path>) -> anyhow::Result<Curriculum> {
    match path {
        Some(path) => Curriculum::load(path)
            .with_context(|| format!("failed to load course from {}", path.display())),
        None => Ok(Curriculum::builtin()),
    }
}

fn print_levels(course: &Curriculum, progress: &Progress) {
    for world in &course.worlds {
        println!("{}", world.title);
        for level in course.levels_in(&world.id) {
            let mark = if progress.is_completed(level.id) {
                "done"
            } else if progress.is_selectable(course, level.id) {
                "open"
            } else {
                "locked"
            };
            println!(
                "  {:>3}. {:<24} {} steps  [{}]",
                level.id,
                level.title,
                level.step_count(),
                mark
            );
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cli = Cli::parse();
    let course = load_course(cli.course.as_deref())?;

    match cli.command {
        Commands::Play {
            level,
            locale,
            model,
            base_url,
        } => {
            let config = ProviderConfig::from_lookup(|key| match key {
                ENV_BASE_URL => base_url.clone(),
                ENV_MODEL => model.clone(),
                _ => std::env::var(key).ok(),
            })?;
            let adapter = ModelAdapter::from_config(config)?;

            let tutor = Tutor::new(
                adapter,
                course,
                TutorConfig {
                    locale,
                    ..TutorConfig::default()
                },
            );
            play::run(tutor, level).await?;
        }

        Commands::Levels => {
            print_levels(&course, &Progress::new());
        }

        Commands::Render { file, output } => {
            let state = VisualState::load(&file)?;
            let svg = render(&state).to_svg();
            match output {
                Some(path) => {
                    std::fs::write(&path, svg)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{}", svg),
            }
        }

        Commands::Suggest { buffer, caret } => {
            let caret = caret.unwrap_or(buffer.len());
            for candidate in codepal_core::suggest(&buffer, caret) {
                println!("{}", candidate);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_play() {
        let cli = Cli::try_parse_from(["codepal", "play", "--level", "2", "--locale", "es"]).unwrap();
        match cli.command {
            Commands::Play { level, locale, .. } => {
                assert_eq!(level, Some(2));
                assert_eq!(locale, Locale::Es);
            }
            _ => panic!("expected play"),
        }

        assert!(Cli::try_parse_from(["codepal", "play", "--locale", "klingon"]).is_err());
    }

    #[test]
    fn test_load_course_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("course.json");
        std::fs::write(&path, "{\"worlds\": [], \"levels\": []}").unwrap();

        assert!(load_course(Some(&path)).is_err());
        assert_eq!(load_course(None).unwrap().levels.len(), 3);
    }
}
