//! # nobjc
//!
//! A message-sending bridge between a scripting host and the Objective-C
//! runtime. Host values are marshalled into the native representation each
//! parameter's type encoding asks for, the message is sent through
//! `objc_msgSend`, and the result comes back as a host value, wrapping
//! returned objects in retained [`ForeignHandle`]s.
//!
//! ## Modules
//!
//! - **Encodings** (`encoding`): type encoding → [`ElementKind`].
//! - **Marshalling** (`marshal/`): host → native arguments, native → host returns.
//! - **Dispatch** (`dispatch/`): signature lookup, call records, execution.
//! - **Values** (`value/`): host values, native slots, foreign handles.
//! - **Runtimes** (`runtime/`): the `libobjc` backend and an in-process mock.

use clap::Parser;
use num_bigint::BigInt;
use std::{path::PathBuf, process::ExitCode};
use tracing_subscriber::EnvFilter;

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod marshal;
pub mod runtime;
pub mod value;

pub use bridge::{method_name_to_selector, selector_to_method_name, Bridge};
pub use config::RuntimeConfig;
pub use encoding::ElementKind;
pub use error::{BridgeError, ErrorKind, HostErrorClass, RuntimeError};
pub use runtime::{ForeignRuntime, RawRef, Selector};
pub use value::{ForeignHandle, HostValue, NativeValue};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Send an Objective-C message from the command line"
)]
pub struct Args {
    /// Framework or dylib to load before sending (repeatable)
    #[arg(short, long = "library", value_name = "PATH")]
    pub libraries: Vec<PathBuf>,
    /// Objective-C runtime library to bind
    #[arg(long, value_name = "PATH")]
    pub libobjc: Option<PathBuf>,
    /// Zero-argument selector sent to each successive result (repeatable)
    #[arg(long = "then", value_name = "SELECTOR")]
    pub then: Vec<String>,
    #[arg(value_name = "CLASS")]
    pub class: String,
    /// Selector, with either `:` or `$` separating its parts
    #[arg(value_name = "SELECTOR")]
    pub selector: String,
    /// `true`, `false`, `null`, `<digits>n` for a bigint, a number, or a string
    #[arg(value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Parses one command-line argument into a host value.
pub fn parse_argument(arg: &str) -> HostValue {
    match arg {
        "true" => return HostValue::Bool(true),
        "false" => return HostValue::Bool(false),
        "null" => return HostValue::Null,
        _ => {}
    }
    if let Some(digits) = arg.strip_suffix('n') {
        if let Ok(b) = digits.parse::<BigInt>() {
            return HostValue::BigInt(b);
        }
    }
    match arg.parse::<f64>() {
        Ok(n) if !arg.trim().is_empty() => HostValue::Number(n),
        _ => HostValue::String(arg.to_string()),
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(config::LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn render(value: &HostValue) -> Result<String, BridgeError> {
    match value {
        HostValue::Handle(h) => h.description(),
        other => Ok(other.to_string()),
    }
}

/// Sends each zero-argument selector to the previous result in turn.
pub fn send_follow_ups(mut result: HostValue, selectors: &[String]) -> Result<HostValue, BridgeError> {
    for selector in selectors {
        let selector = method_name_to_selector(selector);
        let Some(handle) = result.as_handle().cloned() else {
            return Err(BridgeError::NonObjectReceiver {
                selector,
                found: result.type_name(),
            });
        };
        result = handle.dispatch(&selector, &[])?;
    }
    Ok(result)
}

fn run(args: &Args) -> Result<(), BridgeError> {
    let mut config = RuntimeConfig::from_env();
    if let Some(libobjc) = &args.libobjc {
        config = config.with_libobjc(libobjc);
    }
    for library in &args.libraries {
        config = config.with_framework(library);
    }

    let bridge = Bridge::objc(&config)?;
    let class = bridge.class_object(&args.class)?;
    let host_args: Vec<HostValue> = args.args.iter().map(|a| parse_argument(a)).collect();

    let result = class.dispatch(&method_name_to_selector(&args.selector), &host_args)?;
    let result = send_follow_ups(result, &args.then)?;

    println!("{}", render(&result)?);
    Ok(())
}

pub fn run_cli() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", e.host_class());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_argument() {
        assert_eq!(parse_argument("true"), HostValue::Bool(true));
        assert_eq!(parse_argument("null"), HostValue::Null);
        assert_eq!(parse_argument("-12.5"), HostValue::Number(-12.5));
        assert_eq!(
            parse_argument("9223372036854775807n"),
            HostValue::BigInt(BigInt::from(i64::MAX))
        );
        assert_eq!(parse_argument("hello"), HostValue::from("hello"));
        assert_eq!(parse_argument("n"), HostValue::from("n"));
        assert_eq!(parse_argument(""), HostValue::from(""));
    }

    #[test]
    fn test_cli_parses_trailing_arguments() {
        let args = Args::try_parse_from([
            "nobjc",
            "-l",
            "/System/Library/Frameworks/Foundation.framework/Foundation",
            "--then",
            "description",
            "NSNumber",
            "numberWithInt$",
            "-4",
        ])
        .unwrap();
        assert_eq!(args.class, "NSNumber");
        assert_eq!(args.libraries.len(), 1);
        assert_eq!(args.then, vec!["description"]);
        assert_eq!(args.args, vec!["-4"]);
    }
}
