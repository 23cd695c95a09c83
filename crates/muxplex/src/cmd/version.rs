use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Debug, Serialize)]
struct BuildInfo {
    name: &'static str,
    version: &'static str,
    build_target: &'static str,
    git_hash: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    header_size: usize,
    max_local_streams: usize,
    default_max_payload: usize,
    async_codec: bool,
}

impl BuildInfo {
    fn current() -> Self {
        Self {
            name: "muxplex",
            version: env!("CARGO_PKG_VERSION"),
            build_target: option_env!("MUXPLEX_BUILD_TARGET").unwrap_or("unknown"),
            git_hash: option_env!("MUXPLEX_GIT_HASH").unwrap_or("unknown"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
            header_size: muxplex_frame::HEADER_SIZE,
            max_local_streams: 256,
            default_max_payload: muxplex_frame::DEFAULT_MAX_PAYLOAD,
            async_codec: cfg!(feature = "async"),
        }
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let info = BuildInfo::current();
    if args.extended {
        print_record(&info, format);
    } else {
        println!("{} {}", info.name, info.version);
    }
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_serializes_wire_constants() {
        let json = serde_json::to_value(BuildInfo::current()).unwrap();
        assert_eq!(json["name"], "muxplex");
        assert_eq!(json["header_size"], 7);
        assert_eq!(json["max_local_streams"], 256);
    }
}
