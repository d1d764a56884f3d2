/// Interactive Apple II disk image console application

use a2disk::filetype::{parse_prodos_type, prodos_type_name};
use a2disk::format::order_from_extension;
use a2disk::*;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

/// Command completer for the REPL
struct CommandCompleter {
    commands: Vec<&'static str>,
}

impl CommandCompleter {
    fn new() -> Self {
        Self {
            commands: vec![
                "add",
                "cat",
                "check",
                "create",
                "deleted",
                "dir",
                "exit",
                "export",
                "help",
                "info",
                "lock",
                "ls",
                "map",
                "mkdir",
                "mv",
                "open",
                "quit",
                "read",
                "read-block",
                "read-sector",
                "rm",
                "save",
                "settype",
                "tree",
                "unlock",
            ],
        }
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Only complete the first word (command name)
        let line_to_cursor = &line[..pos];
        if line_to_cursor.contains(' ') {
            return Ok((pos, vec![]));
        }

        let prefix = line_to_cursor.to_lowercase();
        let matches: Vec<Pair> = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(&prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// Get the path to the history file
fn history_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|mut p| {
        p.push(".a2disk_history");
        p
    })
}

fn main() {
    env_logger::init();

    println!("=== a2dsk ===");
    println!("Interactive console for Apple II ProDOS and DOS 3.3 disk images.");
    println!("Type 'help' for available commands\n");

    let mut rl = Editor::new().expect("Failed to create editor");
    rl.set_helper(Some(CommandCompleter::new()));

    if let Some(history_path) = history_path() {
        let _ = rl.load_history(&history_path);
    }

    let mut volume: Option<Volume> = None;

    loop {
        let readline = rl.readline("> ");
        let input = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                if let Some(history_path) = history_path() {
                    let _ = rl.save_history(&history_path);
                }
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        let parts = parse_command_line(input);
        if parts.is_empty() {
            continue;
        }
        let command = parts[0].to_lowercase();

        match command.as_str() {
            "help" => {
                print_help();
            }
            "quit" | "exit" => {
                if let Some(history_path) = history_path() {
                    let _ = rl.save_history(&history_path);
                }
                println!("Goodbye!");
                break;
            }
            "open" => {
                if parts.len() < 2 {
                    println!("Usage: open <path>");
                    continue;
                }
                match Volume::open(&parts[1]) {
                    Ok(vol) => {
                        println!(
                            "Opened: {} ({}, {})",
                            parts[1],
                            vol.fs_type(),
                            vol.image().order()
                        );
                        volume = Some(vol);
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "create" => {
                let spec = match parts.get(1).map(|s| s.to_lowercase()).as_deref() {
                    Some("dos") | Some("dos33") => VolumeSpec::dos33_140k(),
                    Some("800k") => VolumeSpec::prodos_800k(),
                    Some("hd") | Some("32m") => VolumeSpec::prodos_32m(),
                    _ => VolumeSpec::prodos_140k(),
                };
                let spec = match parts.get(2) {
                    Some(name) => spec.with_volume_name(name),
                    None => spec,
                };

                match DiskImage::builder().spec(spec).build().and_then(Volume::from_image) {
                    Ok(vol) => {
                        println!(
                            "Created new {} image ({} blocks)",
                            vol.fs_type(),
                            vol.image().total_blocks()
                        );
                        volume = Some(vol);
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "info" => {
                if let Some(ref vol) = volume {
                    print_info(vol);
                } else {
                    println!("No image loaded. Use 'open <path>' or 'create' first.");
                }
            }
            "ls" | "dir" | "cat" => {
                if let Some(ref vol) = volume {
                    let path = parts.get(1).map(String::as_str).unwrap_or("");
                    match vol.fs().read_dir(path) {
                        Ok(entries) => print_entries(&entries),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "tree" => {
                if let Some(ref vol) = volume {
                    match vol.fs().catalog() {
                        Ok(catalog) => print_tree(&catalog, 0),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "deleted" => match volume {
                Some(Volume::Dos33(ref fs)) => match fs.deleted_entries() {
                    Ok(entries) if entries.is_empty() => println!("No deleted files."),
                    Ok(entries) => {
                        println!("{:<30} {:>4} {:>7} {:>4}", "Name", "Type", "T/S", "Secs");
                        println!("{}", "-".repeat(50));
                        for entry in entries {
                            println!(
                                "{:<30} {:>4} {:>3}/{:<3} {:>4}",
                                entry.name,
                                entry.dos_type().to_string(),
                                entry.ts_list.0,
                                entry.ts_list.1,
                                entry.sector_count
                            );
                        }
                    }
                    Err(e) => println!("Error: {}", e),
                },
                Some(_) => println!("Deleted entries are only kept on DOS 3.3 disks."),
                None => println!("No image loaded."),
            },
            "read" => {
                if let Some(ref vol) = volume {
                    if parts.len() < 2 {
                        println!("Usage: read <path>");
                        continue;
                    }
                    match vol.fs().read_file(&parts[1]) {
                        Ok(data) => {
                            println!("File: {} ({} bytes)", parts[1], data.len());
                            print_hex_dump(&data, 256);
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "export" => {
                if let Some(ref vol) = volume {
                    if parts.len() < 2 {
                        println!("Usage: export <path> [output_path] [raw]");
                        println!("  DOS 3.3 files are trimmed to their recorded length unless 'raw' is given.");
                        continue;
                    }
                    let src = &parts[1];
                    let mut output_path = None;
                    let mut raw_mode = false;
                    for arg in parts.iter().skip(2) {
                        if arg.eq_ignore_ascii_case("raw") {
                            raw_mode = true;
                        } else if output_path.is_none() {
                            output_path = Some(arg.clone());
                        }
                    }
                    let output_path = output_path
                        .unwrap_or_else(|| src.rsplit('/').next().unwrap_or(src).to_string());

                    let data = match (vol, raw_mode) {
                        (Volume::Dos33(fs), true) => fs.read_file_raw(src),
                        _ => vol.fs().read_file(src),
                    };
                    match data.and_then(|d| std::fs::write(&output_path, &d).map(|_| d.len()).map_err(DiskError::from)) {
                        Ok(len) => println!("Exported {} ({} bytes) to {}", src, len, output_path),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "add" => {
                if let Some(ref mut vol) = volume {
                    if parts.len() < 2 {
                        println!("Usage: add <host_file> [name] [type] [aux]");
                        continue;
                    }
                    let data = match std::fs::read(&parts[1]) {
                        Ok(d) => d,
                        Err(e) => {
                            println!("Error: {}", e);
                            continue;
                        }
                    };
                    let name = parts.get(2).cloned().unwrap_or_else(|| host_file_name(&parts[1]));
                    let file_type = match parse_file_type(parts.get(3), parts.get(4)) {
                        Some(ft) => ft,
                        None => {
                            println!("Unknown file type: {}", parts[3]);
                            continue;
                        }
                    };
                    match vol.fs_mut().write_file(&name, &data, file_type) {
                        Ok(stored) => println!("Added {} ({} bytes)", stored, data.len()),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "rm" => {
                if let Some(ref mut vol) = volume {
                    if parts.len() < 2 {
                        println!("Usage: rm <path>");
                        continue;
                    }
                    match vol.fs_mut().delete_file(&parts[1]) {
                        Ok(()) => println!("Deleted {}", parts[1]),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "mv" => {
                if let Some(ref mut vol) = volume {
                    if parts.len() < 3 {
                        println!("Usage: mv <path> <new_name>");
                        continue;
                    }
                    match vol.fs_mut().rename_file(&parts[1], &parts[2]) {
                        Ok(name) => println!("Renamed {} to {}", parts[1], name),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "mkdir" => {
                if let Some(ref mut vol) = volume {
                    if parts.len() < 2 {
                        println!("Usage: mkdir <path>");
                        continue;
                    }
                    match vol.fs_mut().create_directory(&parts[1]) {
                        Ok(name) => println!("Created directory {}", name),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "settype" => {
                if let Some(ref mut vol) = volume {
                    if parts.len() < 3 {
                        println!("Usage: settype <path> <type> [aux]");
                        continue;
                    }
                    let Some(file_type) = parse_file_type(parts.get(2), parts.get(3)) else {
                        println!("Unknown file type: {}", parts[2]);
                        continue;
                    };
                    match vol.fs_mut().set_file_type(&parts[1], file_type) {
                        Ok(()) => println!(
                            "{} is now {} ${:04X}",
                            parts[1],
                            prodos_type_name(file_type.file_type),
                            file_type.aux_type
                        ),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "lock" | "unlock" => {
                if let Some(ref mut vol) = volume {
                    if parts.len() < 2 {
                        println!("Usage: {} <path>", command);
                        continue;
                    }
                    let locked = command == "lock";
                    match vol.fs_mut().set_locked(&parts[1], locked) {
                        Ok(()) => println!("{} {}", if locked { "Locked" } else { "Unlocked" }, parts[1]),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "read-block" => {
                if let Some(ref vol) = volume {
                    let Some(block) = parts.get(1).and_then(|s| parse_number(s)) else {
                        println!("Usage: read-block <block>");
                        continue;
                    };
                    match vol.image().read_block(block) {
                        Ok(data) => {
                            println!("Block {} ({} bytes):", block, data.len());
                            print_hex_dump(&data, 512);
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "read-sector" => {
                if let Some(ref vol) = volume {
                    let track = parts.get(1).and_then(|s| parse_number(s));
                    let sector = parts.get(2).and_then(|s| parse_number(s));
                    let (Some(track), Some(sector)) = (track, sector) else {
                        println!("Usage: read-sector <track> <sector>");
                        continue;
                    };
                    match vol.image().read_sector(track, sector) {
                        Ok(data) => {
                            println!("Sector {}/{} ({} bytes):", track, sector, data.len());
                            print_hex_dump(&data, 256);
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "map" => {
                if let Some(ref vol) = volume {
                    match vol.fs().allocation() {
                        Ok(map) => {
                            let report = vol.fs().check().ok();
                            draw_allocation_map(&map, report.as_ref());
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "check" => {
                if let Some(ref vol) = volume {
                    match vol.fs().check() {
                        Ok(report) => print_check(&report),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "save" => {
                if let Some(ref mut vol) = volume {
                    let path = match parts.get(1).cloned().or_else(|| vol.image().filename().map(String::from)) {
                        Some(p) => p,
                        None => {
                            println!("Usage: save <path> [po|do]");
                            continue;
                        }
                    };
                    let order = match parts.get(2).map(|s| s.to_lowercase()).as_deref() {
                        Some("po") => Some(SectorOrder::Prodos),
                        Some("do") => Some(SectorOrder::Dos),
                        _ => order_from_extension(&path).filter(|o| *o != vol.image().order()),
                    };
                    let result = match order {
                        Some(order) if order != vol.image().order() => vol.export(&path, order),
                        _ => vol.save(&path),
                    };
                    match result {
                        Ok(()) => println!("Saved to: {}", path),
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            _ => {
                println!("Unknown command: {}. Type 'help' for available commands.", command);
            }
        }
    }
}

fn parse_command_line(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(current.clone());
                    current.clear();
                }
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn print_help() {
    println!("Available commands:");
    println!("  open <path>                    - Open an image (.po .do .dsk .hdv .2mg)");
    println!("  create [prodos|800k|hd|dos] [name] - Create a blank formatted image");
    println!("  info                           - Show volume information");
    println!("  ls [dir]                       - List a directory (cat, dir)");
    println!("  tree                           - Show the whole catalog tree");
    println!("  deleted                        - List deleted DOS 3.3 entries");
    println!("  read <path>                    - Hex dump a file");
    println!("  export <path> [out] [raw]      - Copy a file to the host filesystem");
    println!("  add <host_file> [name] [type] [aux] - Add a host file (type: BIN, TXT, $06, A, B, ...)");
    println!("  rm <path>                      - Delete a file or empty directory");
    println!("  mv <path> <new_name>           - Rename a file or directory");
    println!("  mkdir <path>                   - Create a ProDOS subdirectory");
    println!("  settype <path> <type> [aux]    - Change a file's type");
    println!("  lock <path> / unlock <path>    - Lock or unlock a file");
    println!("  read-block <n>                 - Hex dump a 512-byte block");
    println!("  read-sector <track> <sector>   - Hex dump a 256-byte DOS sector");
    println!("  map                            - Visual allocation map (yellow=orphan, red=used but free)");
    println!("  check                          - Cross-check directory structure against the bitmap");
    println!("  save [path] [po|do]            - Save, optionally converting the ordering");
    println!("  help                           - Show this help");
    println!("  quit, exit                     - Exit");
}

fn print_info(volume: &Volume) {
    let image = volume.image();
    println!("Container: {}", image.format());
    if let Some(header) = image.container() {
        println!(
            "2IMG creator: {}, data at {} ({} bytes){}",
            String::from_utf8_lossy(&header.creator),
            header.data_offset,
            header.data_length,
            if header.is_locked() { ", write protected" } else { "" }
        );
    }
    if let Some(name) = image.filename() {
        println!("File: {}", name);
    }
    println!("Blocks: {} ({} tracks)", image.total_blocks(), image.num_tracks());
    match volume.fs().info() {
        Ok(info) => println!("{}", info),
        Err(e) => println!("Error: {}", e),
    }
}

fn print_entries(entries: &[DirEntry]) {
    if entries.is_empty() {
        println!("No files found.");
        return;
    }
    println!(
        "{:<1} {:<30} {:<4} {:>6} {:>8} {:>5} {:<16}",
        "", "Name", "Type", "Aux", "Size", "Used", "Modified"
    );
    println!("{}", "-".repeat(78));
    for entry in entries {
        let modified = entry
            .modified
            .map(|dt| dt.format("%d-%b-%y %H:%M").to_string())
            .unwrap_or_else(|| "<no date>".to_string());
        println!(
            "{:<1} {:<30} {:<4} {:>6} {:>8} {:>5} {:<16}",
            if entry.attributes.locked { "*" } else { "" },
            entry.name,
            entry.type_name,
            format!("${:04X}", entry.aux_type),
            entry.size,
            entry.units_used,
            modified
        );
    }
}

fn print_tree(entries: &[CatalogEntry], depth: usize) {
    for node in entries {
        let indent = "  ".repeat(depth);
        if node.entry.is_directory() {
            println!("{}{}/", indent, node.entry.name);
            print_tree(&node.children, depth + 1);
        } else {
            println!(
                "{}{} ({}, {} bytes)",
                indent, node.entry.name, node.entry.type_name, node.data.len()
            );
        }
    }
}

fn print_check(report: &CheckReport) {
    println!("Reachable units: {}", report.reachable);
    if report.is_clean() {
        println!("No problems found.");
        return;
    }
    if !report.used_but_free.is_empty() {
        println!("In use but marked free: {:?}", report.used_but_free);
    }
    if !report.orphans.is_empty() {
        println!("Marked used but unreachable: {:?}", report.orphans);
    }
    for problem in &report.problems {
        println!("Problem: {}", problem);
    }
}

fn host_file_name(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// ProDOS type from a name, hex byte or DOS 3.3 letter; BIN when absent
fn parse_file_type(type_arg: Option<&String>, aux_arg: Option<&String>) -> Option<FileType> {
    let (file_type, default_aux) = match type_arg {
        None => return Some(FileType::binary(0)),
        Some(text) => match Dos33FileType::from_letter(text) {
            Some(dos) => dos33_to_prodos(dos.code()),
            None => (parse_prodos_type(text)?, 0),
        },
    };
    let aux = match aux_arg {
        Some(text) => parse_number(text).and_then(|n| u16::try_from(n).ok())?,
        None => default_aux,
    };
    Some(FileType::new(file_type, aux))
}

fn parse_number(s: &str) -> Option<usize> {
    if let Some(hex) = s.strip_prefix('$').or_else(|| s.strip_prefix("0x")).or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn print_hex_dump(data: &[u8], max_bytes: usize) {
    let len = data.len().min(max_bytes);

    for (i, chunk) in data[..len].chunks(16).enumerate() {
        print!("{:04X}: ", i * 16);

        for (j, byte) in chunk.iter().enumerate() {
            print!("{:02X} ", byte);
            if j == 7 {
                print!(" ");
            }
        }

        // Pad if less than 16 bytes
        for j in chunk.len()..16 {
            print!("   ");
            if j == 7 {
                print!(" ");
            }
        }

        print!(" |");

        // Apple II text usually has the high bit set
        for byte in chunk {
            let low = byte & 0x7F;
            let c = if (32..127).contains(&low) { low as char } else { '.' };
            print!("{}", c);
        }

        println!("|");
    }

    if data.len() > max_bytes {
        println!("... ({} more bytes)", data.len() - max_bytes);
    }
}
