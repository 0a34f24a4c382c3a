use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    craftctl_lib::run().await
}
