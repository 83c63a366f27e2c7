use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(name = "openai", alias = "open-ai")]
    OpenAI,
    Sarvam,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "gpt-4.1-mini",
            ProviderKind::Sarvam => "sarvam-m",
            ProviderKind::Anthropic => "claude-sonnet-4-5",
            ProviderKind::Ollama => "llama3.1",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "finbox-dpr", version, about = "Chapter-by-chapter Detailed Project Report generator")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[arg(long, value_enum, global = true)]
    pub provider: Option<ProviderKind>,

    #[arg(long, global = true)]
    pub model: Option<String>,

    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Directory holding .finbox/ (database and artifacts)
    #[arg(long, global = true)]
    pub root: Option<String>,

    /// Progress database path (overrides <root>/.finbox/progress.db)
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[arg(long, default_value_t = false, global = true)]
    pub save_request: bool,

    #[arg(long, default_value_t = false, global = true)]
    pub save_response: bool,

    #[arg(long, default_value_t = false, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate, revise and accept chapters interactively; resumes saved progress
    Wizard {
        #[arg(long)]
        user: String,
        #[arg(long)]
        idea: String,
        #[arg(long)]
        promoter: String,
        /// Write the assembled report here once every chapter is accepted
        #[arg(long)]
        out: Option<String>,
    },
    /// Show saved progress
    Status {
        #[arg(long)]
        user: String,
        #[arg(long)]
        idea: Option<String>,
    },
    /// Write accepted chapters, with filled-in values, as Markdown
    Export {
        #[arg(long)]
        user: String,
        #[arg(long)]
        idea: String,
        #[arg(long)]
        out: String,
    },
    /// Elaborate the idea and generate a complete structured report in one pass
    Full {
        #[arg(long)]
        idea: String,
        #[arg(long)]
        promoter: String,
        /// Skip the elaboration step and use the idea text as the profile description
        #[arg(long, default_value_t = false)]
        no_elaborate: bool,
        #[arg(long)]
        out: Option<String>,
        /// Also write the raw structured report as JSON
        #[arg(long)]
        json_out: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wizard_with_globals() {
        let args = Args::try_parse_from([
            "finbox-dpr",
            "wizard",
            "--user",
            "u1",
            "--idea",
            "Paper Plate Unit",
            "--promoter",
            "Asha",
            "--provider",
            "sarvam",
        ])
        .unwrap();
        assert!(matches!(args.provider, Some(ProviderKind::Sarvam)));
        match args.command {
            Command::Wizard { idea, out, .. } => {
                assert_eq!(idea, "Paper Plate Unit");
                assert!(out.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn export_requires_out() {
        assert!(Args::try_parse_from(["finbox-dpr", "export", "--user", "u", "--idea", "i"]).is_err());
    }
}
