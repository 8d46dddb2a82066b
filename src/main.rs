use dash_runner::interface;

#[tokio::main]
async fn main() {
    match dash_runner::run().await {
        // The application's exit status passes through verbatim.
        Ok(code) => std::process::exit(code),
        // Launcher-layer failures exit 2 so scripts can tell "the app
        // failed" from "the app never launched".
        Err(e) => {
            interface::status_fail(&e.to_string());
            std::process::exit(2);
        }
    }
}
