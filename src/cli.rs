//! CLI: (go | json) structs → normalize → (schema | django | validate)
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::{debug, info};

use crate::codegen::Codegen;
use crate::config::{Config, Mode};
use crate::engine::Engine;
use crate::error::Error;
use crate::ir::Struct;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// normalize ORM-annotated struct declarations into a relational schema and
/// render it as Django models
#[derive(Parser, Debug)]
#[command(name = "g2d", version)]
pub struct CommandLineInterface {
    /// more log output (-v info, -vv debug, -vvv trace); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// normalize and print the model list as JSON
    Schema(SchemaOut),
    /// normalize and emit Django `models.py` (and `admin.py`)
    Django(DjangoOut),
    /// report every schema error instead of stopping at the first
    Validate(ValidateOut),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    /// by file extension: `.go` is Go source, anything else a JSON struct dump
    Auto,
    Go,
    Json,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    #[arg(long, value_enum, default_value_t = InputFormat::Auto)]
    format: InputFormat,

    /// JQ pre-process filter, applied to each input's struct dump.
    #[arg(long)]
    jq_expr: Option<String>,

    /// JSON config file (conventions, mode, type aliases)
    #[arg(long)]
    config: Option<PathBuf>,

    /// overrides the configured error mode
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// evaluate structs on the rayon pool
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct DjangoOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// directory for models.py / admin.py (stdout if omitted)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// also emit admin.py
    #[arg(long, default_value_t = false)]
    admin: bool,
}

#[derive(clap::Parser, Debug)]
struct ValidateOut {
    #[command(flatten)]
    input_settings: InputSettings,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load_config(&self) -> Result<Config> {
        let mut config = match self.config.as_ref() {
            Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if self.parallel {
            config.parallel = true;
        }
        Ok(config)
    }

    fn load_process(&self, mut apply: impl FnMut(Struct) -> crate::error::Result<()>) -> Result<()> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let structs = self
                .read_structs(&source_path)
                .with_context(|| format!("reading {source_path_str}"))?;
            info!(file = %source_path_str, structs = structs.len(), "input loaded");
            for s in structs {
                apply(s)?;
            }
        }
        Ok(())
    }

    fn read_structs(&self, path: &Path) -> crate::error::Result<Vec<Struct>> {
        let is_go = match self.format {
            InputFormat::Go => true,
            InputFormat::Json => false,
            InputFormat::Auto => path.extension().is_some_and(|x| x == "go"),
        };
        let structs = if is_go {
            crate::extract::extract_file(path)?
        } else {
            let source = std::fs::read_to_string(path)?;
            crate::path_de::structs_from_str(&source)?
        };
        let Some(jq_expr) = self.jq_expr.as_ref() else {
            return Ok(structs);
        };
        let dump = serde_json::to_value(&structs)?;
        let filtered = crate::jq_exec::run_jaq_collect(jq_expr, &dump)?;
        crate::path_de::structs_from_value(filtered)
    }

    fn engine(&self) -> Result<Engine> {
        let mut engine = Engine::new(self.load_config()?);
        self.load_process(|s| engine.observe_struct(s))?;
        Ok(engine)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Schema(target) => {
                // debug path
                if target.input_settings.no_op {
                    eprintln!("{self:#?}");
                    return Ok(());
                }
                let models = target.input_settings.engine()?.solve()?;
                let schema_src = serde_json::to_string_pretty(&models)?;
                match target.out.as_ref() {
                    Some(out) => write_file(out, &schema_src)?,
                    None => println!("{schema_src}"),
                }
            }
            Command::Django(target) => {
                if target.input_settings.no_op {
                    eprintln!("{self:#?}");
                    return Ok(());
                }
                let engine = target.input_settings.engine()?;
                let models = engine.solve()?;

                let mut cg = Codegen::new(engine.config());
                cg.emit_models(&models)?;
                let models_src = cg.into_string();
                let admin_src = target.admin.then(|| {
                    let mut cg = Codegen::new(engine.config());
                    cg.emit_admin(&models);
                    cg.into_string()
                });

                match target.out_dir.as_ref() {
                    Some(dir) => {
                        write_file(&dir.join("models.py"), &models_src)?;
                        if let Some(admin_src) = admin_src {
                            write_file(&dir.join("admin.py"), &admin_src)?;
                        }
                    }
                    None => {
                        println!("{models_src}");
                        if let Some(admin_src) = admin_src {
                            println!("{admin_src}");
                        }
                    }
                }
            }
            Command::Validate(target) => {
                if target.input_settings.no_op {
                    eprintln!("{self:#?}");
                    return Ok(());
                }
                let mut settings = target.input_settings.clone();
                settings.mode = Some(Mode::Batch);
                let engine = settings.engine()?;
                let errors = engine.validate();
                if errors.is_empty() {
                    let models = engine.structs().models().count();
                    println!("{} {models} model structs, no schema errors", "ok".green().bold());
                    return Ok(());
                }
                for error in &errors {
                    println!("{} {} {error}", "error".red().bold(), format!("[{}]", error.code()).yellow());
                }
                bail!("{} schema errors", errors.len());
            }
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), bytes = contents.len(), "wrote output");
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> crate::error::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let matched = glob::glob(pattern)
                .map_err(|e| Error::Glob(format!("{pattern}: {e}")))?
                .map(|entry| entry.map_err(|e| Error::Glob(e.to_string())))
                .collect::<crate::error::Result<Vec<_>>>()?;
            if matched.is_empty() {
                return Err(Error::Glob(format!("pattern matched no files: {pattern}")));
            }
            out.extend(matched);
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
