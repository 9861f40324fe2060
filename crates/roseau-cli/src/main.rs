//! `roseau` — binaire CLI.
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation de la
//! journalisation, lecture/écriture de fichiers, et délégation à
//! `roseau_cli` (lib).

#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use roseau_cli as cli;

#[derive(Debug, Parser)]
#[command(name = "roseau", version, about = "roseau — traduire, inspecter, exécuter des procédures virtualisées", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Traduire un listage source et sceller chaque procédure
    Translate {
        /// Listage (mnémoniques, une instruction par ligne)
        input: PathBuf,
        /// Artefact de sortie (stdout si omis)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Déchiffrer un artefact et afficher son bytecode
    Inspect {
        /// Artefact (un enregistrement nom/clé/iv/données par ligne)
        input: PathBuf,
    },

    /// Exécuter une procédure d'un artefact
    ///
    /// Le résolveur ne résout rien : une procédure qui touche des
    /// symboles hôtes avorte avec `symbole introuvable`.
    Run {
        /// Artefact
        input: PathBuf,
        /// Procédure à exécuter (la première si omis)
        #[arg(short, long)]
        name: Option<String>,
        /// Arguments de la procédure (après --)
        #[arg(last = true)]
        args: Vec<String>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn real_main() -> Result<()> {
    let opt = Opt::parse();
    init_tracing(opt.verbose);

    match opt.cmd {
        Command::Translate { input, output } => {
            let listing = fs::read_to_string(&input)
                .with_context(|| format!("lecture de {}", input.display()))?;
            let artefact = cli::translate_listing(&listing)?;
            match output {
                Some(path) => fs::write(&path, artefact)
                    .with_context(|| format!("écriture de {}", path.display()))?,
                None => print!("{artefact}"),
            }
        }
        Command::Inspect { input } => {
            let artefact = fs::read_to_string(&input)
                .with_context(|| format!("lecture de {}", input.display()))?;
            print!("{}", cli::inspect_artefact(&artefact)?);
        }
        Command::Run { input, name, args } => {
            let artefact = fs::read_to_string(&input)
                .with_context(|| format!("lecture de {}", input.display()))?;
            let result = cli::run_artefact(&artefact, name.as_deref(), &args)?;
            println!("{result:?}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match real_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("erreur: {err:#}");
            ExitCode::FAILURE
        }
    }
}
