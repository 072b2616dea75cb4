//! Command-line front end for the dual-plaintext container: `encrypt` packs
//! two files into one container, `decrypt` recovers whichever plaintext a
//! given key routes to. Mirrors the library's `encrypt`/`decrypt` calls
//! one-to-one; holds no cryptographic logic of its own.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use duplex_paillier::primegen::generate_keypair;
use duplex_paillier::{
    decrypt, encrypt, Config, DecryptKeySource, Error, KeyMaterial, PublicKey, SecretKey,
};
use num_bigint::BigUint;
use rand::rngs::OsRng;
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[clap(name = "dualcrypt")]
#[clap(about = "Pack or unpack a key-indistinguishable dual-plaintext container")]
#[clap(version, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Encrypt(EncryptCli),
    Decrypt(DecryptCli),
}

#[derive(Debug, Args)]
struct EncryptCli {
    /// Plaintext file that lands in stream A.
    #[clap(long)]
    a: PathBuf,
    /// Plaintext file that lands in stream B.
    #[clap(long)]
    b: PathBuf,
    /// Where to write the container.
    #[clap(long)]
    out: PathBuf,
    /// Derive the keypair from this passphrase (mutually exclusive with `--generate`).
    #[clap(long)]
    passphrase: Option<String>,
    /// Generate a fresh random keypair instead of deriving one.
    #[clap(long)]
    generate: bool,
    /// Paillier modulus size in bits.
    #[clap(long, default_value_t = Config::default().key_bits)]
    bits: u32,
    /// With `--generate`, write the secret key here (required to decrypt later).
    #[clap(long)]
    key_out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DecryptCli {
    /// Container file produced by `encrypt`.
    #[clap(long)]
    container: PathBuf,
    /// Where to write the recovered plaintext.
    #[clap(long)]
    out: PathBuf,
    /// Re-derive the key from this passphrase (mutually exclusive with `--key-file`).
    #[clap(long)]
    passphrase: Option<String>,
    /// Load a previously generated secret key from this file.
    #[clap(long, requires = "route_key")]
    key_file: Option<PathBuf>,
    /// Routing key bytes to pair with `--key-file`: the container does not
    /// record which recipient reaches which stream, so a key-file recipient
    /// still needs their own routing key, distributed out of band by
    /// whoever ran `encrypt`.
    #[clap(long)]
    route_key: Option<String>,
}

const EXIT_USAGE: u8 = 1;
const EXIT_CRYPTO: u8 = 2;
const EXIT_IO: u8 = 3;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Encrypt(cli) => run_encrypt(cli),
        Commands::Decrypt(cli) => run_decrypt(cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => {
            error!("dualcrypt failed");
            ExitCode::from(code)
        }
    }
}

fn run_encrypt(cli: EncryptCli) -> Result<(), u8> {
    let key_material = match (cli.passphrase, cli.generate) {
        (Some(_), true) => {
            eprintln!("--passphrase and --generate are mutually exclusive");
            return Err(EXIT_USAGE);
        }
        (Some(passphrase), false) => Some(KeyMaterial::Passphrase {
            passphrase: passphrase.into_bytes(),
            bits: cli.bits,
        }),
        (None, true) => None, // generated explicitly below, so the key file can be saved first
        (None, false) => {
            eprintln!("one of --passphrase or --generate is required");
            return Err(EXIT_USAGE);
        }
    };

    let bytes_a = fs::read(&cli.a).map_err(|e| io_err("reading --a", e))?;
    let bytes_b = fs::read(&cli.b).map_err(|e| io_err("reading --b", e))?;

    let config = Config::default().with_key_bits(cli.bits);
    let mut rng = OsRng;

    let key_material = match key_material {
        Some(km) => km,
        None => {
            let key_out = cli.key_out.ok_or_else(|| {
                eprintln!("--generate requires --key-out so the secret key can be saved");
                EXIT_USAGE
            })?;
            let (pk, sk) = generate_keypair(cli.bits, config.miller_rabin_rounds, &mut rng, None)
                .map_err(crypto_err)?;
            write_key_file(&key_out, &pk, &sk).map_err(|e| io_err("writing --key-out", e))?;
            KeyMaterial::Supplied { pk, sk }
        }
    };

    let container =
        encrypt(&bytes_a, &bytes_b, key_material, &config, &mut rng).map_err(crypto_err)?;
    fs::write(&cli.out, container).map_err(|e| io_err("writing --out", e))?;
    debug!(path = %cli.out.display(), "container written");
    Ok(())
}

fn run_decrypt(cli: DecryptCli) -> Result<(), u8> {
    let (key_bytes, key_source) = match (cli.passphrase, cli.key_file) {
        (Some(_), Some(_)) => {
            eprintln!("--passphrase and --key-file are mutually exclusive");
            return Err(EXIT_USAGE);
        }
        (Some(passphrase), None) => (passphrase.into_bytes(), DecryptKeySource::Passphrase),
        (None, Some(path)) => {
            let sk = read_key_file(&path).map_err(|e| io_err("reading --key-file", e))?;
            let route_key = cli.route_key.ok_or_else(|| {
                eprintln!("--key-file requires --route-key");
                EXIT_USAGE
            })?;
            (route_key.into_bytes(), DecryptKeySource::Supplied(sk))
        }
        (None, None) => {
            eprintln!("one of --passphrase or --key-file is required");
            return Err(EXIT_USAGE);
        }
    };

    let container_bytes = fs::read(&cli.container).map_err(|e| io_err("reading --container", e))?;
    let config = Config::default();
    let plaintext =
        decrypt(&container_bytes, &key_bytes, key_source, &config).map_err(crypto_err)?;
    fs::write(&cli.out, plaintext).map_err(|e| io_err("writing --out", e))?;
    debug!(path = %cli.out.display(), "plaintext recovered");
    Ok(())
}

fn io_err(context: &str, e: std::io::Error) -> u8 {
    error!(context, error = %e, "i/o failure");
    EXIT_IO
}

fn crypto_err(e: Error) -> u8 {
    error!(error = %e, "cryptographic failure");
    EXIT_CRYPTO
}

/// Hex-encoded `n`/`lambda`/`mu`, one per line. A CLI convenience for
/// carrying a generated secret key between `encrypt --generate` and a later
/// `decrypt --key-file`; not part of the container's own wire format, and
/// never anything the container itself carries.
fn write_key_file(path: &PathBuf, pk: &PublicKey, sk: &SecretKey) -> std::io::Result<()> {
    let contents = format!(
        "{}\n{}\n{}\n",
        pk.n().to_str_radix(16),
        sk.lambda().to_str_radix(16),
        sk.mu().to_str_radix(16),
    );
    fs::write(path, contents)
}

fn read_key_file(path: &PathBuf) -> std::io::Result<SecretKey> {
    let contents = fs::read_to_string(path)?;
    let mut lines = contents.lines();
    let parse = |s: Option<&str>| -> std::io::Result<BigUint> {
        let s = s.ok_or_else(invalid_key_file)?;
        BigUint::parse_bytes(s.as_bytes(), 16).ok_or_else(invalid_key_file)
    };
    let n = parse(lines.next())?;
    let lambda = parse(lines.next())?;
    let mu = parse(lines.next())?;
    Ok(SecretKey::from_lambda_mu(n, lambda, mu))
}

fn invalid_key_file() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed key file")
}
