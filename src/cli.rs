use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for the fleet-uploader tool.
///
/// This struct defines all available command-line options for the upload
/// orchestrator. Options select the task description file, the discovery
/// strategy for the mounted media, and the platform environment to talk to.
#[derive(Parser, Debug)]
#[clap(name = "fleet-uploader", about = "Multi-cloud upload orchestrator for fleet sensor data")]
#[clap(subcommand_negates_reqs = true)]
pub struct Args {
    /// Path to the task info JSON file describing this upload job
    #[clap(short = 'i', long, required = true)]
    pub task_info: Option<PathBuf>,

    /// Package discovery strategy for the mounted media
    #[clap(short = 't', long, required = true)]
    pub source_type: Option<SourceKind>,

    /// Platform environment to load configuration for (prod, test)
    #[clap(short = 'm', long, default_value = "prod")]
    pub mode: String,

    /// Serial number of the source disk (default: local hostname)
    #[clap(short = 's', long)]
    pub sn: Option<String>,

    /// Upload packages even when the ledger already marks them uploaded
    #[clap(long)]
    pub force_upload: bool,

    /// Skip the platform completion callback and message notifications
    #[clap(long)]
    pub skip_notify: bool,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

/// Discovery strategy applied to the input root.
///
/// Each variant corresponds to one fleet data layout and selects how
/// packages are found, grouped, and registered with the platform.
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum SourceKind {
    /// Date-stamped trip folders holding raw recorder output
    Trip,
    /// Flat clip folders and sidecar archives
    Clip,
    /// Manifest-driven vehicle batches accumulated into clips
    Batch,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Trip => write!(f, "trip"),
            SourceKind::Clip => write!(f, "clip"),
            SourceKind::Batch => write!(f, "batch"),
        }
    }
}

/// Available subcommands for the uploader.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default platform configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = "platform_prod.yaml")]
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_basic_args_parsing() {
        let args = Args::parse_from(&[
            "fleet-uploader",
            "--task-info", "/data/task_info.json",
            "--source-type", "trip",
            "--verbose",
        ]);

        assert_eq!(args.task_info, Some(PathBuf::from("/data/task_info.json")));
        assert_eq!(args.source_type, Some(SourceKind::Trip));
        assert!(args.verbose);
        assert!(!args.force_upload);
        assert!(!args.skip_notify);
    }

    #[test]
    fn test_short_flags() {
        let args = Args::parse_from(&[
            "fleet-uploader",
            "-i", "/data/task_info.json",
            "-t", "batch",
            "-m", "test",
            "-s", "SN12345",
        ]);

        assert_eq!(args.task_info, Some(PathBuf::from("/data/task_info.json")));
        assert_eq!(args.source_type, Some(SourceKind::Batch));
        assert_eq!(args.mode, "test");
        assert_eq!(args.sn, Some("SN12345".to_string()));
    }

    #[test]
    fn test_default_values() {
        let args = Args::parse_from(&[
            "fleet-uploader",
            "-i", "/data/task_info.json",
            "-t", "trip",
        ]);

        assert_eq!(args.mode, "prod");
        assert!(args.sn.is_none());
        assert!(!args.verbose);
        assert!(!args.force_upload);
        assert!(!args.skip_notify);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_task_info_and_source_type_required() {
        assert!(Args::try_parse_from(&["fleet-uploader"]).is_err());
        assert!(Args::try_parse_from(&["fleet-uploader", "-t", "trip"]).is_err());
        assert!(Args::try_parse_from(&["fleet-uploader", "-i", "/data/task_info.json"]).is_err());
    }

    #[test]
    fn test_force_and_skip_flags() {
        let args = Args::parse_from(&[
            "fleet-uploader",
            "-i", "/data/task_info.json",
            "-t", "clip",
            "--force-upload",
            "--skip-notify",
        ]);

        assert_eq!(args.source_type, Some(SourceKind::Clip));
        assert!(args.force_upload);
        assert!(args.skip_notify);
    }

    #[test]
    fn test_unknown_source_type_rejected() {
        let result = Args::try_parse_from(&[
            "fleet-uploader",
            "-i", "/data/task_info.json",
            "-t", "stream",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_init_config_subcommand() {
        let args = Args::parse_from(&[
            "fleet-uploader",
            "init-config",
            "custom-platform.yaml",
        ]);

        match args.command {
            Some(Commands::InitConfig { path }) => {
                assert_eq!(path, PathBuf::from("custom-platform.yaml"));
            }
            _ => panic!("Expected InitConfig command"),
        }
    }

    #[test]
    fn test_init_config_default_path() {
        let args = Args::parse_from(&["fleet-uploader", "init-config"]);

        match args.command {
            Some(Commands::InitConfig { path }) => {
                assert_eq!(path, PathBuf::from("platform_prod.yaml"));
            }
            _ => panic!("Expected InitConfig command"),
        }
    }

    #[test]
    fn test_source_kind_display() {
        assert_eq!(format!("{}", SourceKind::Trip), "trip");
        assert_eq!(format!("{}", SourceKind::Clip), "clip");
        assert_eq!(format!("{}", SourceKind::Batch), "batch");
    }
}
