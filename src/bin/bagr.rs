use std::fs::File;
use std::path::PathBuf;

use ansi_term::Colour;
use clap::Parser;
use env_logger::Target;
use log::{error, LevelFilter};

use bagr::bagit::{
    create_bag, validate_bag_with_options, BagItVersion, DigestAlgorithm, Error, IssueLevel,
    TagList, ValidateOptions, ValidationIssue, ValidationVerdict, BAGIT_DEFAULT_VERSION,
    LABEL_BAG_COUNT, LABEL_BAG_GROUP_IDENTIFIER, LABEL_BAG_SIZE, LABEL_BAGIT_PROFILE_IDENTIFIER,
    LABEL_CONTACT_EMAIL, LABEL_CONTACT_NAME, LABEL_CONTACT_PHONE, LABEL_EXTERNAL_DESCRIPTION,
    LABEL_EXTERNAL_IDENTIFIER, LABEL_INTERNAL_SENDER_DESCRIPTION, LABEL_INTERNAL_SENDER_IDENTIFIER,
    LABEL_ORGANIZATION_ADDRESS, LABEL_SOURCE_ORGANIZATION,
};

/// A CLI for interacting with BagIt bags
#[derive(Debug, Parser)]
#[clap(name = "bagr", author = "Peter Winckles <pwinckles@pm.me>", version)]
pub struct BagrArgs {
    /// Directories to bag, or to validate when `--validate` is set
    ///
    /// Defaults to the current directory.
    #[clap(value_name = "DIRECTORY", multiple_values = true, default_value = ".")]
    pub directories: Vec<PathBuf>,

    /// Validate an existing bag instead of creating a new one
    #[clap(long)]
    pub validate: bool,

    /// Trust the declared Payload-Oxum instead of recomputing fixity
    ///
    /// Only applies with `--validate`. Fails if the bag has no Payload-Oxum.
    #[clap(long, requires = "validate")]
    pub fast: bool,

    /// Only check structural completeness; never recompute digests
    ///
    /// Only applies with `--validate`.
    #[clap(long = "completeness-only", requires = "validate")]
    pub completeness_only: bool,

    /// Number of worker threads used to hash files
    ///
    /// Defaults to 0, which lets the hashing thread pool pick its own
    /// parallelism based on the number of available cores.
    #[clap(short = 'p', long, default_value_t = 0, value_name = "N")]
    pub processes: usize,

    /// Write log output to this file instead of stderr
    #[clap(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Suppress error messages and other command specific logging
    #[clap(short, long)]
    pub quiet: bool,

    /// Increase log level
    #[clap(short = 'V', long)]
    pub verbose: bool,

    /// Disable all output styling
    #[clap(short = 'S', long)]
    pub no_styles: bool,

    /// Use SHA-256 when creating manifests
    #[clap(long)]
    pub sha256: bool,
    /// Use SHA-512 when creating manifests
    #[clap(long)]
    pub sha512: bool,
    /// Use SHA-1 when creating manifests
    #[clap(long)]
    pub sha1: bool,
    /// Use MD5 when creating manifests
    #[clap(long)]
    pub md5: bool,
    /// Use BLAKE2b when creating manifests
    #[clap(long)]
    pub blake2b: bool,

    #[clap(long = "source-organization", value_name = "VALUE")]
    pub source_organization: Option<String>,
    #[clap(long = "organization-address", value_name = "VALUE")]
    pub organization_address: Option<String>,
    #[clap(long = "contact-name", value_name = "VALUE")]
    pub contact_name: Option<String>,
    #[clap(long = "contact-phone", value_name = "VALUE")]
    pub contact_phone: Option<String>,
    #[clap(long = "contact-email", value_name = "VALUE")]
    pub contact_email: Option<String>,
    #[clap(long = "external-description", value_name = "VALUE")]
    pub external_description: Option<String>,
    #[clap(long = "external-identifier", value_name = "VALUE")]
    pub external_identifier: Option<String>,
    #[clap(long = "bag-size", value_name = "VALUE")]
    pub bag_size: Option<String>,
    #[clap(long = "bag-group-identifier", value_name = "VALUE")]
    pub bag_group_identifier: Option<String>,
    #[clap(long = "bag-count", value_name = "VALUE")]
    pub bag_count: Option<String>,
    #[clap(long = "internal-sender-identifier", value_name = "VALUE")]
    pub internal_sender_identifier: Option<String>,
    #[clap(long = "internal-sender-description", value_name = "VALUE")]
    pub internal_sender_description: Option<String>,
    #[clap(long = "bagit-profile-identifier", value_name = "VALUE")]
    pub bagit_profile_identifier: Option<String>,
}

fn selected_algorithms(args: &BagrArgs) -> Vec<DigestAlgorithm> {
    let mut algorithms = Vec::new();
    if args.sha256 {
        algorithms.push(DigestAlgorithm::Sha256);
    }
    if args.sha512 {
        algorithms.push(DigestAlgorithm::Sha512);
    }
    if args.sha1 {
        algorithms.push(DigestAlgorithm::Sha1);
    }
    if args.md5 {
        algorithms.push(DigestAlgorithm::Md5);
    }
    if args.blake2b {
        algorithms.push(DigestAlgorithm::Blake2b);
    }
    algorithms
}

/// Collects every `--<header>` flag the user set into a `TagList`, following
/// `original_source/bagit_modules/parsing.py::BagHeaderAction`'s pattern of
/// folding recognized header flags into the bag-info map. `clap`'s derive API
/// has no equivalent of Python's dynamic per-header registration, so each
/// header gets its own field above and is collected here by hand.
fn bag_info_from_args(args: &BagrArgs) -> Result<TagList, Error> {
    let mut info = TagList::new();

    let headers: [(&str, &Option<String>); 13] = [
        (LABEL_SOURCE_ORGANIZATION, &args.source_organization),
        (LABEL_ORGANIZATION_ADDRESS, &args.organization_address),
        (LABEL_CONTACT_NAME, &args.contact_name),
        (LABEL_CONTACT_PHONE, &args.contact_phone),
        (LABEL_CONTACT_EMAIL, &args.contact_email),
        (LABEL_EXTERNAL_DESCRIPTION, &args.external_description),
        (LABEL_EXTERNAL_IDENTIFIER, &args.external_identifier),
        (LABEL_BAG_SIZE, &args.bag_size),
        (LABEL_BAG_GROUP_IDENTIFIER, &args.bag_group_identifier),
        (LABEL_BAG_COUNT, &args.bag_count),
        (
            LABEL_INTERNAL_SENDER_IDENTIFIER,
            &args.internal_sender_identifier,
        ),
        (
            LABEL_INTERNAL_SENDER_DESCRIPTION,
            &args.internal_sender_description,
        ),
        (LABEL_BAGIT_PROFILE_IDENTIFIER, &args.bagit_profile_identifier),
    ];

    for (label, value) in headers {
        if let Some(value) = value {
            info.add_tag(label, value)?;
        }
    }

    Ok(info)
}

fn print_issue(styled: bool, issue: &ValidationIssue) {
    let prefix = match issue.level() {
        IssueLevel::Error => "ERROR",
        IssueLevel::Warn => "WARN",
    };

    if styled {
        let colour = match issue.level() {
            IssueLevel::Error => Colour::Red,
            IssueLevel::Warn => Colour::Yellow,
        };
        eprintln!("{}: {}", colour.paint(prefix), issue.message());
    } else {
        eprintln!("{prefix}: {}", issue.message());
    }
}

fn init_logging(args: &BagrArgs) {
    let log_level = if args.quiet {
        LevelFilter::Off
    } else if args.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false);

    if let Some(log_path) = &args.log {
        match File::create(log_path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("Failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        }
    }

    builder.init();
}

fn run_validate(args: &BagrArgs, styled: bool) -> bool {
    let options = ValidateOptions {
        fast: args.fast,
        completeness_only: args.completeness_only,
        processes: args.processes,
    };

    let mut error_occurred = false;

    for directory in &args.directories {
        match validate_bag_with_options(directory, options) {
            Ok(result) => {
                for issue in result.issues() {
                    print_issue(styled, issue);
                }
                match result.verdict() {
                    ValidationVerdict::Valid if !args.quiet => {
                        println!("{}: valid", directory.display());
                    }
                    ValidationVerdict::Complete if !args.quiet => {
                        println!("{}: complete", directory.display());
                    }
                    ValidationVerdict::Invalid => {
                        error_occurred = true;
                        if !args.quiet {
                            println!("{}: invalid", directory.display());
                        }
                    }
                    _ => {}
                }
            }
            Err(e) => {
                error!("{}: {e}", directory.display());
                error_occurred = true;
            }
        }
    }

    error_occurred
}

fn run_bag(args: &BagrArgs) -> bool {
    let algorithms = selected_algorithms(args);
    let version = BagItVersion::from(BAGIT_DEFAULT_VERSION);

    let info = match bag_info_from_args(args) {
        Ok(info) => info,
        Err(e) => {
            error!("{e}");
            return true;
        }
    };

    let mut error_occurred = false;

    for directory in &args.directories {
        match create_bag(
            directory,
            directory,
            info.clone(),
            &algorithms,
            false,
            version,
            args.processes,
        ) {
            Ok(bag) => {
                if !args.quiet {
                    println!("Created bag at {}", bag.base_dir().display());
                }
            }
            Err(e) => {
                error!("{}: {e}", directory.display());
                error_occurred = true;
            }
        }
    }

    error_occurred
}

fn main() {
    let mut args = BagrArgs::parse();

    init_logging(&args);

    // If the output is being piped then we should disable styling
    if atty::isnt(atty::Stream::Stdout) {
        args.no_styles = true;
    }
    let styled = !args.no_styles;

    let error_occurred = if args.validate {
        run_validate(&args, styled)
    } else {
        run_bag(&args)
    };

    std::process::exit(if error_occurred { 1 } else { 0 });
}
