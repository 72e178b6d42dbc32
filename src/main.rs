use clap::{arg, crate_version, Command};

use archivefs::{exit_code, Archive, Error};

const RCH: &str = "unreachable was reached";

fn main() {
    env_logger::init();
    let code = run();
    std::process::exit(code);
}

fn run() -> i32 {
    let long_help = "Examples:
---------
Create:  `archivefs init my_archive.bin`
Store:   `archivefs add my_archive.bin notes.txt \"hello, archive\"`
Store:   `archivefs addfile my_archive.bin report.pdf ./report.pdf`
Fetch:   `archivefs get my_archive.bin notes.txt`
Browse:  `archivefs list my_archive.bin`";

    let mut main_cmd = Command::new("archivefs")
        .about("single-file, persistent, compressed archive store")
        .after_long_help(long_help)
        .version(crate_version!());

    main_cmd = main_cmd.subcommand(
        Command::new("init").arg(arg!(<FILE> "archive path")).about("create a new, empty archive"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("add")
            .arg(arg!(<FILE> "archive path"))
            .arg(arg!(<NAME> "entry name"))
            .arg(arg!(<CONTENT> "literal content to store"))
            .about("store literal text content under a name"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("addfile")
            .arg(arg!(<FILE> "archive path"))
            .arg(arg!(<NAME> "entry name"))
            .arg(arg!(<SRCPATH> "path of the file to read content from"))
            .about("store the contents of a file under a name"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("get")
            .arg(arg!(<FILE> "archive path"))
            .arg(arg!(<NAME> "entry name"))
            .about("print a stored entry's decompressed content to stdout"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("list").arg(arg!(<FILE> "archive path")).about("list every entry, with sizes"),
    );

    let matches = main_cmd.get_matches();

    let result = if let Some(cmd) = matches.subcommand_matches("init") {
        cmd_init(cmd.get_one::<String>("FILE").expect(RCH))
    } else if let Some(cmd) = matches.subcommand_matches("add") {
        cmd_add(
            cmd.get_one::<String>("FILE").expect(RCH),
            cmd.get_one::<String>("NAME").expect(RCH),
            cmd.get_one::<String>("CONTENT").expect(RCH).as_bytes(),
        )
    } else if let Some(cmd) = matches.subcommand_matches("addfile") {
        cmd_addfile(
            cmd.get_one::<String>("FILE").expect(RCH),
            cmd.get_one::<String>("NAME").expect(RCH),
            cmd.get_one::<String>("SRCPATH").expect(RCH),
        )
    } else if let Some(cmd) = matches.subcommand_matches("get") {
        cmd_get(cmd.get_one::<String>("FILE").expect(RCH), cmd.get_one::<String>("NAME").expect(RCH))
    } else if let Some(cmd) = matches.subcommand_matches("list") {
        cmd_list(cmd.get_one::<String>("FILE").expect(RCH))
    } else {
        eprintln!("no subcommand given, try --help");
        return exit_code::GENERIC;
    };

    match result {
        Ok(()) => exit_code::OK,
        Err(err) => {
            eprintln!("archivefs: {err}");
            err.exit_code()
        }
    }
}

fn cmd_init(path: &str) -> Result<(), Error> {
    Archive::init(path)?;
    println!("initialized {path}");
    Ok(())
}

fn cmd_add(path: &str, name: &str, content: &[u8]) -> Result<(), Error> {
    let mut archive = Archive::open(path)?;
    archive.put(name, content)?;
    Ok(())
}

fn cmd_addfile(path: &str, name: &str, srcpath: &str) -> Result<(), Error> {
    let data = std::fs::read(srcpath)?;
    let mut archive = Archive::open(path)?;
    archive.put(name, &data)?;
    Ok(())
}

fn cmd_get(path: &str, name: &str) -> Result<(), Error> {
    let mut archive = Archive::open(path)?;
    let data = archive.get(name)?;
    use std::io::Write;
    std::io::stdout().write_all(&data)?;
    Ok(())
}

fn cmd_list(path: &str) -> Result<(), Error> {
    let mut archive = Archive::open(path)?;
    for entry in archive.list()? {
        println!("{}\t{}\t{}", entry.name, entry.original_size, entry.compressed_size);
    }
    Ok(())
}
