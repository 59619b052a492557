// AWS Lambda binary entry point
//
// Build with: cargo build -p esf-lambda --release
// The binary is named `bootstrap` as required by the provided.al2023 runtime.

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    esf_lambda::run().await
}
