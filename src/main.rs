fn main() {
    match event_watch_lib::run() {
        Ok(status) => match serde_json::to_string_pretty(&status) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("failed to render run status: {err}"),
        },
        Err(err) => {
            eprintln!("event-watch failed: {err:#}");
            std::process::exit(1);
        }
    }
}
