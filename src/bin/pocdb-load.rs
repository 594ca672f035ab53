use std::io::{self, BufRead};
use std::path::Path;
use std::process;

use clap::{App, Arg};
use log::error;

use pocdb::client::Client;
use pocdb::membership::Membership;
use pocdb::messages::ReturnCode;

// Reads "key value" lines from stdin and writes each one, aborting on the
// first failure.
fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let matches = App::new("pocdb-load")
        .about("bulk-loads key-value pairs from standard input")
        .arg(
            Arg::with_name("cluster")
                .long("cluster")
                .takes_value(true)
                .help("membership file, five lines of \"<hex id> <host:port>\""),
        )
        .get_matches();

    let members = match matches.value_of("cluster") {
        None => Membership::standard(),
        Some(path) => match Membership::from_file(Path::new(path)) {
            Ok(members) => members,
            Err(e) => {
                error!("could not load cluster file {}: {}", path, e);
                process::exit(1);
            }
        },
    };

    let mut client = Client::new(members);
    let stdin = io::stdin();
    for (lineno, line) in stdin.lock().lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("could not read line {}: {}", lineno + 1, e);
                process::exit(1);
            }
        };
        if line.is_empty() {
            continue;
        }

        let (key, value) = match line.find(' ') {
            Some(split) => (&line[..split], &line[split + 1..]),
            None => {
                error!("line {} has no value", lineno + 1);
                process::exit(1);
            }
        };

        let rc = client.put(key.as_bytes(), value.as_bytes());
        if rc != ReturnCode::Success {
            error!("put {:?} failed on line {}: {}", key, lineno + 1, rc);
            process::exit(1);
        }
    }
}
