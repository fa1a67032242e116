fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let rom_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!(
                "No ROM path provided.\n\
                 Usage: pocketboy path/to/rom.gb [frames]"
            );
            std::process::exit(1);
        }
    };
    let frames: u32 = match args.next() {
        Some(count) => match count.parse() {
            Ok(frames) => frames,
            Err(_) => {
                eprintln!("Invalid frame count '{}'", count);
                std::process::exit(1);
            }
        },
        // A minute of emulated time at ~59.7 fps.
        None => 3600,
    };

    let rom = match std::fs::read(&rom_path) {
        Ok(rom) => rom,
        Err(err) => {
            eprintln!("Failed to read '{}': {}", rom_path, err);
            std::process::exit(1);
        }
    };

    match pocketboy::run(&rom, frames) {
        Ok(output) => {
            if !output.is_empty() {
                print!("{}", String::from_utf8_lossy(&output));
            }
        }
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(1);
        }
    }
}
