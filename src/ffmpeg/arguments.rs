use std::ffi::OsString;

use crate::compression_job::CompressionJob;

/// Builds the encoder argv. Order is fixed: input, bitrate, buffer size,
/// thread cap, passthrough args, output.
pub fn build_args(job: &CompressionJob, kbps: u64) -> Vec<OsString> {
    fn os(s: &str) -> OsString { OsString::from(s) }

    let bitrate = format!("{kbps}k");
    let mut args = vec![
        os("-hide_banner"),
        os("-nostdin"),
        os("-i"), job.input_path.clone().into_os_string(),
        os("-b:v"), os(&bitrate),
        os("-bufsize"), os(&bitrate),
        os("-threads"), os(&job.concurrency_limit.to_string()),
    ];

    // passed through verbatim as separate argv entries, never through a shell
    args.extend(job.extra_encoder_args.iter().map(OsString::from));

    args.push(job.output_path.clone().into_os_string());
    args
}
