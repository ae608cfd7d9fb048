use log::*;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use clap::{crate_authors, crate_version, App, AppSettings, Arg, ArgMatches};
use libc::{c_int, off_t};
use simple_error::{bail, try_with, SimpleError};

use mmapcore::consts::{self, MAP_PRIVATE, MAP_SHARED, PROT_EXEC, PROT_READ, PROT_WRITE};
use mmapcore::fd::SENTINEL;
use mmapcore::{MapArgs, MappingHandle};

type Result<T> = std::result::Result<T, SimpleError>;

const PROT_NAMES: &[&str] = &["r", "w", "x"];

struct MapOptions {
    path: Option<PathBuf>,
    length: usize,
    offset: off_t,
    flags: c_int,
    prot: c_int,
    dump: usize,
}

fn parse_prot(args: &ArgMatches) -> c_int {
    let names = args
        .values_of_t::<String>("prot")
        .unwrap_or_else(|e| e.exit());
    names.iter().fold(0, |prot, name| match name.as_str() {
        "r" => prot | PROT_READ,
        "w" => prot | PROT_WRITE,
        "x" => prot | PROT_EXEC,
        _ => unreachable!(), // restricted by possible_values
    })
}

fn map_options(args: &ArgMatches) -> MapOptions {
    MapOptions {
        path: args.value_of("FILE").map(PathBuf::from),
        length: args.value_of_t_or_exit("length"),
        offset: args.value_of_t_or_exit("offset"),
        flags: if args.is_present("private") {
            MAP_PRIVATE
        } else {
            MAP_SHARED
        },
        prot: parse_prot(args),
        dump: args.value_of_t_or_exit("dump"),
    }
}

fn open_backing(opts: &MapOptions) -> Result<Option<File>> {
    let path = match &opts.path {
        Some(p) => p,
        None => return Ok(None),
    };
    // private mappings never write back, so a read-only descriptor is enough
    let write = opts.prot & PROT_WRITE != 0 && opts.flags == MAP_SHARED;
    let file = try_with!(
        OpenOptions::new().read(true).write(write).open(path),
        "cannot open {}",
        path.display()
    );
    Ok(Some(file))
}

fn hexdump(bytes: &[u8]) {
    for (i, line) in bytes.chunks(16).enumerate() {
        let hex = line
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{:08x}  {}", i * 16, hex);
    }
}

fn map(opts: &MapOptions) -> Result<()> {
    let file = open_backing(opts)?;
    if file.is_none() && opts.length == 0 {
        bail!("--length is required for anonymous mappings");
    }
    let args = MapArgs {
        fd: file.as_ref().map_or(SENTINEL, |f| f.as_raw_fd()),
        length: opts.length,
        flags: opts.flags,
        prot: opts.prot,
        offset: opts.offset,
    };
    let mut mm = try_with!(MappingHandle::create_with(&args), "cannot create mapping");
    // the mapping holds its own descriptor from here on
    drop(file);

    let access = try_with!(mm.access(), "cannot query mapping");
    println!("address:   {:?}", try_with!(mm.addr(), "cannot query mapping"));
    println!("length:    {}", try_with!(mm.len(), "cannot query mapping"));
    println!("fd:        {}", try_with!(mm.fd(), "cannot query mapping"));
    println!("anonymous: {}", mm.is_anonymous());
    println!("access:    {:?}", access);

    if opts.dump > 0 {
        let bytes = try_with!(mm.as_slice(), "cannot read mapping");
        hexdump(&bytes[..opts.dump.min(bytes.len())]);
    }

    try_with!(mm.close(), "cannot close mapping");
    Ok(())
}

fn constants() {
    println!("PAGESIZE    {}", consts::page_size());
    println!("PROT_READ   {:#x}", PROT_READ);
    println!("PROT_WRITE  {:#x}", PROT_WRITE);
    println!("PROT_EXEC   {:#x}", PROT_EXEC);
    println!("MAP_SHARED  {:#x}", MAP_SHARED);
    println!("MAP_PRIVATE {:#x}", MAP_PRIVATE);
}

fn setup_logging(matches: &clap::ArgMatches) {
    if matches.is_present("verbose") {
        env_logger::Builder::new().parse_filters("debug").init();
        return;
    }

    let loglevel = matches.value_of("loglevel");
    if let Some(level) = loglevel {
        env_logger::Builder::new().parse_filters(level).init();
        return;
    }

    // default
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn main_app() -> App<'static> {
    let constants_command = App::new("constants")
        .about("Print the native page size and mmap constants.")
        .version(crate_version!())
        .author(crate_authors!("\n"));

    let map_command = App::new("map")
        .about("Map a file (or anonymous memory) and describe the mapping.")
        .version(crate_version!())
        .author(crate_authors!("\n"))
        .arg(
            Arg::new("FILE")
                .help("File to map. Maps anonymous memory if omitted.")
                .index(1),
        )
        .arg(
            Arg::new("length")
                .short('n')
                .long("length")
                .takes_value(true)
                .default_value("0")
                .help("Bytes to map. 0 maps to the end of the file."),
        )
        .arg(
            Arg::new("offset")
                .short('o')
                .long("offset")
                .takes_value(true)
                .default_value("0")
                .help("Byte offset into the file. Must be page aligned."),
        )
        .arg(
            Arg::new("private")
                .short('p')
                .long("private")
                .help("Copy-on-write mapping (MAP_PRIVATE) instead of MAP_SHARED"),
        )
        .arg(
            Arg::new("prot")
                .long("prot")
                .takes_value(true)
                .require_delimiter(true)
                .value_delimiter(',')
                .default_value("r")
                .possible_values(PROT_NAMES)
                .help("Protection, seperated by ','"),
        )
        .arg(
            Arg::new("dump")
                .long("dump")
                .takes_value(true)
                .default_value("0")
                .help("Hexdump the first N mapped bytes"),
        );

    App::new("mmapctl")
        .about("Create and inspect memory mappings.")
        .version(crate_version!())
        .author(crate_authors!("\n"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::new("verbose")
             .short('v')
             .conflicts_with("loglevel")
             .help("shorthand for --loglevel debug)"))
        .arg(Arg::new("loglevel")
             .short('l')
             .takes_value(true)
             .help("Finegrained verbosity control. See docs.rs/env_logger. Examples: [error, warn, info, debug, trace]"))
        .subcommands([constants_command, map_command])
}

fn main() {
    let matches = main_app().get_matches();
    setup_logging(&matches);
    match matches.subcommand() {
        Some(("constants", _)) => constants(),
        Some(("map", sub_matches)) => {
            if let Err(err) = map(&map_options(sub_matches)) {
                error!("{}", err);
                std::process::exit(1);
            }
        }
        Some((_, _)) => unreachable!(),
        None => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_map_args() {
        let matches = main_app()
            .try_get_matches_from(&["mmapctl", "map", "-n", "4096", "--private", "--prot", "r,w"])
            .expect("arguments rejected");
        let (_, sub) = matches.subcommand().expect("no subcommand");
        let opts = map_options(sub);
        assert!(opts.path.is_none());
        assert_eq!(opts.length, 4096);
        assert_eq!(opts.flags, MAP_PRIVATE);
        assert_eq!(opts.prot, PROT_READ | PROT_WRITE);
    }

    #[test]
    fn test_map_anonymous() {
        let opts = MapOptions {
            path: None,
            length: 4096,
            offset: 0,
            flags: MAP_PRIVATE,
            prot: PROT_READ,
            dump: 0,
        };
        assert!(map(&opts).is_ok());
    }

    #[test]
    fn test_anonymous_needs_length() {
        let opts = MapOptions {
            path: None,
            length: 0,
            offset: 0,
            flags: MAP_SHARED,
            prot: PROT_READ,
            dump: 0,
        };
        assert!(map(&opts).is_err());
    }
}
