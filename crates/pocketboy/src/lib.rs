use anyhow::{Context, Result};
use pocketboy_dmg::GameBoy;

/// Run a ROM headlessly for a number of frames and return whatever it
/// wrote to the serial debug sink.
///
/// CPU test ROMs report pass/fail over serial, so this is enough to run
/// the usual conformance suites without any display attached.
pub fn run(rom: &[u8], frames: u32) -> Result<Vec<u8>> {
    let mut gb = GameBoy::new();
    gb.load_cartridge(rom).context("failed to load cartridge")?;

    if let Some(header) = gb.header() {
        log::info!(
            "running {:?} ({} ROM bank(s), {} RAM bank(s))",
            header.title,
            header.rom_banks,
            header.ram_banks
        );
    }

    for frame in 0..frames {
        gb.run_frame();
        if gb.is_stopped() {
            log::info!("CPU entered STOP after frame {frame}");
            break;
        }
    }

    Ok(gb.serial_output().to_vec())
}
