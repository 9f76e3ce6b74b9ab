// Copyright 2025 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use codeatlas::config::{self, Config};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codeatlas", version, about = "Incremental code index and question answering")]
struct Cli {
	/// Project directory (defaults to the current directory)
	#[arg(long, global = true)]
	path: Option<PathBuf>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Build or incrementally update the index
	Index(commands::index::IndexArgs),
	/// Ask a question about the indexed code
	Ask(commands::ask::AskArgs),
	/// Show index lifecycle and statistics
	Status(commands::status::StatusArgs),
	/// Remove all index data for the project
	Clear(commands::clear::ClearArgs),
	/// Generate shell completions
	Completion {
		#[arg(value_enum)]
		shell: Shell,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();
	let cli = Cli::parse();

	if let Commands::Completion { shell } = &cli.command {
		let mut command = Cli::command();
		clap_complete::generate(*shell, &mut command, "codeatlas", &mut std::io::stdout());
		return Ok(());
	}

	let project_dir = match &cli.path {
		Some(path) => path.clone(),
		None => std::env::current_dir()?,
	};
	let _guard = init_tracing(&project_dir)?;
	let config = Config::load(&project_dir)?;

	match &cli.command {
		Commands::Index(args) => commands::index::execute(&project_dir, &config, args).await,
		Commands::Ask(args) => commands::ask::execute(&project_dir, &config, args).await,
		Commands::Status(args) => commands::status::execute(&project_dir, &config, args).await,
		Commands::Clear(args) => commands::clear::execute(&project_dir, args),
		Commands::Completion { .. } => unreachable!("handled above"),
	}
}

/// Human-readable logs on stderr, JSON logs in the project data directory.
/// The returned guard flushes the file writer on drop.
fn init_tracing(project_dir: &std::path::Path) -> Result<WorkerGuard> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let logs_dir = config::project_logs_dir(project_dir);
	std::fs::create_dir_all(&logs_dir)?;
	let file_appender = tracing_appender::rolling::daily(logs_dir, "codeatlas.log");
	let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

	tracing_subscriber::registry()
		.with(filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_writer(std::io::stderr)
				.with_target(false),
		)
		.with(tracing_subscriber::fmt::layer().json().with_writer(file_writer))
		.init();

	Ok(guard)
}
