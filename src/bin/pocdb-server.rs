use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::{App, Arg};
use log::error;

use pocdb::daemon::Daemon;
use pocdb::membership::Membership;
use pocdb::network::tcp::TcpNetwork;
use pocdb::store::logfile::LogFileStore;

fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let matches = App::new("pocdb-server")
        .about("pocdb replica daemon")
        .arg(
            Arg::with_name("replica")
                .help("replica letter, A through E")
                .required(true),
        )
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .takes_value(true)
                .default_value(".")
                .help("directory holding the durable store"),
        )
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

    let letter = matches.value_of("replica").unwrap_or("");
    let index = match Membership::index_for_letter(letter) {
        Some(index) => index,
        None => {
            error!("replica must be one of A through E, not {:?}", letter);
            process::exit(1);
        }
    };
    let id = members.members()[index].id;

    let data_dir = matches.value_of("data-dir").unwrap_or(".");
    let store = match LogFileStore::open(Path::new(data_dir)) {
        Ok(store) => store,
        Err(e) => {
            error!("could not open store in {}: {}", data_dir, e);
            process::exit(1);
        }
    };

    let net = match TcpNetwork::bind(id, members.clone()) {
        Ok(net) => net,
        Err(e) => {
            error!("could not bind replica address: {}", e);
            process::exit(1);
        }
    };

    let daemon = Daemon::new(id, members, Arc::new(store), Arc::new(net));
    daemon.run();
}
