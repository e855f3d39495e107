#![forbid(unsafe_code)]

fn main() {
    std::process::exit(sqlgrounder_cli::run());
}
