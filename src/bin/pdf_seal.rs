//! Command line front end.
//!
//! ```text
//! pdf_seal sign <input> <output> --key <key.pem> --chain <chain.pem>
//!          [--name N] [--location L] [--reason R] [--digest sha256] [--pades]
//! pdf_seal verify <input> [--summary]
//! ```

use std::fs;
use std::path::PathBuf;
use std::process;

use pdf_seal::signatures::{
    DigestAlgorithm, PemKeyStore, SignOptions, SignRequest, SignaturePolicy, SigningCredentials,
};
use pdf_seal::{PdfDocument, ReportKind};

const USAGE: &str = "Usage:
  pdf_seal sign <input> <output> --key <key.pem> --chain <chain.pem> [--name N] [--location L] [--reason R] [--digest sha256] [--pades]
  pdf_seal verify <input> [--summary]";

struct SignConfig {
    input: PathBuf,
    output: PathBuf,
    key: PathBuf,
    chain: PathBuf,
    name: Option<String>,
    location: Option<String>,
    reason: Option<String>,
    digest: DigestAlgorithm,
    pades: bool,
}

struct VerifyConfig {
    input: PathBuf,
    summary: bool,
}

enum Command {
    Sign(SignConfig),
    Verify(VerifyConfig),
}

impl Command {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let (command, rest) = args.split_first().ok_or("missing command")?;

        let mut positional = Vec::new();
        let mut flags: Vec<(String, Option<String>)> = Vec::new();
        let mut i = 0;
        while i < rest.len() {
            match rest[i].as_str() {
                "--pades" | "--summary" => flags.push((rest[i].clone(), None)),
                flag if flag.starts_with("--") => {
                    i += 1;
                    let value = rest
                        .get(i)
                        .ok_or_else(|| format!("{} needs a value", flag))?;
                    flags.push((flag.to_string(), Some(value.clone())));
                },
                value => positional.push(PathBuf::from(value)),
            }
            i += 1;
        }
        let flag = |name: &str| {
            flags
                .iter()
                .find(|(flag, _)| flag == name)
                .map(|(_, value)| value.clone())
        };

        match command.as_str() {
            "sign" => {
                let [input, output] = <[PathBuf; 2]>::try_from(positional)
                    .map_err(|_| "sign needs <input> and <output>".to_string())?;
                let digest = match flag("--digest").flatten() {
                    Some(name) => DigestAlgorithm::from_name(&name)
                        .ok_or_else(|| format!("unknown digest '{}'", name))?,
                    None => DigestAlgorithm::default(),
                };
                Ok(Command::Sign(SignConfig {
                    input,
                    output,
                    key: flag("--key").flatten().ok_or("--key is required")?.into(),
                    chain: flag("--chain").flatten().ok_or("--chain is required")?.into(),
                    name: flag("--name").flatten(),
                    location: flag("--location").flatten(),
                    reason: flag("--reason").flatten(),
                    digest,
                    pades: flag("--pades").is_some(),
                }))
            },
            "verify" => {
                let [input] = <[PathBuf; 1]>::try_from(positional)
                    .map_err(|_| "verify needs <input>".to_string())?;
                Ok(Command::Verify(VerifyConfig {
                    input,
                    summary: flag("--summary").is_some(),
                }))
            },
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

fn sign(config: SignConfig) -> pdf_seal::Result<()> {
    let store = PemKeyStore::from_pem(
        &fs::read_to_string(&config.key)?,
        &fs::read_to_string(&config.chain)?,
    )?;
    let credentials = SigningCredentials::from_first_alias(&store)?;
    let policy = if config.pades {
        SignaturePolicy::pades_b(&credentials)?
    } else {
        SignaturePolicy::baseline()
    }
    .with_digest_algorithm(config.digest);

    let mut options = SignOptions::default();
    if let Some(name) = config.name {
        options = options.with_name(name);
    }
    if let Some(location) = config.location {
        options = options.with_location(location);
    }
    if let Some(reason) = config.reason {
        options = options.with_reason(reason);
    }

    let request = SignRequest::new(credentials)
        .with_policy(policy)
        .with_options(options);
    PdfDocument::open(&config.input)?.sign(&config.output, &request)?;
    println!("Signed {} -> {}", config.input.display(), config.output.display());
    Ok(())
}

fn verify(config: VerifyConfig) -> pdf_seal::Result<bool> {
    let kind = if config.summary {
        ReportKind::Summary
    } else {
        ReportKind::Simple
    };
    let report = PdfDocument::open(&config.input)?.report(kind)?;
    println!("{}", report.to_json()?);
    Ok(report.all_valid())
}

fn main() {
    env_logger::init();

    let command = match Command::from_args() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            process::exit(2);
        },
    };

    let outcome = match command {
        Command::Sign(config) => sign(config).map(|_| true),
        Command::Verify(config) => verify(config),
    };
    match outcome {
        Ok(true) => {},
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        },
    }
}
