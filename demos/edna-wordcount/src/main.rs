#[macro_use]
extern crate log;

mod app;

pub fn main() {
    if let Err(e) = app::run() {
        error!("word count failed. {}", e);
        std::process::exit(1);
    }
}
