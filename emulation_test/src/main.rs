use chip_profiles::config::hex_address;
use chip_profiles::profiles::{CYW27035B1_LMP_CODE_BASE, CYW27035B1_LMP_HOOK_ADDRESS};
use chip_profiles::{ChipProfile, ProfileError, ProfileRegistry};
use clap::Parser;
use data_types::PhysicalAddress;
use log::{error, info};
use patchram::emulation::EmulatedDevice;
use patchram::{HookDescriptor, HookInjectionBuilder, LmpTableEntry, Patchram};
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// LMP send handler referenced by the hook's table entry
const LMP_SEND_HANDLER: PhysicalAddress = PhysicalAddress::from_const(0x00086A40);
const LMP_PACKET_LENGTH: u8 = 0x20;

/// `bx lr`
const RETURN_STUB: [u8; 2] = [0x70, 0x47];

#[derive(Parser)]
#[command(author, about = "Installs the LMP hook on an emulated controller", long_about = None)]
struct Args {
    /// Built-in chip profile to use
    #[arg(short, long, default_value = "CYW27035B1")]
    chip: String,

    /// Load the chip profile from a JSON file instead
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Print the selected profile as JSON and exit
    #[arg(long)]
    dump_profile: bool,

    /// ROM address to hook
    #[arg(long, value_parser = hex_address::parse)]
    entry: Option<PhysicalAddress>,

    /// Start of the free RAM window for the hook code
    #[arg(long, value_parser = hex_address::parse)]
    code_base: Option<PhysicalAddress>,

    /// Size of the free RAM window in bytes
    #[arg(short, long, default_value = "0x600", value_parser = parse_length)]
    window: usize,

    /// File with pre-assembled hook code, a plain return if omitted
    #[arg(long)]
    code: Option<PathBuf>,
}

fn parse_length(text: &str) -> Result<usize, String> {
    let result = match text.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => text.parse(),
    };
    result.map_err(|err| format!("invalid length '{}': {}", text, err))
}

fn load_profile(args: &Args) -> Result<ChipProfile, ProfileError> {
    match &args.profile {
        Some(path) => ChipProfile::from_file(path),
        None => ProfileRegistry::builtin()?.lookup(&args.chip).cloned(),
    }
}

fn seed_device(profile: &ChipProfile) -> EmulatedDevice {
    let info = profile.device_info();
    let mut device = EmulatedDevice::new();
    device.load(info.bd_addr_address, &[0x56, 0x34, 0x12, 0xef, 0xbe, 0xad]);
    device.load(info.name_address, b"CYW927035 emulated\0");
    device
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let profile = load_profile(args)?;

    if args.dump_profile {
        let mut stdout = std::io::stdout().lock();
        profile.to_json_writer(&mut stdout)?;
        writeln!(stdout)?;
        return Ok(());
    }

    let mut patchram = Patchram::attach(&profile, seed_device(&profile))?;
    info!(
        "{}: {} '{}'",
        profile.name(),
        patchram.bd_addr()?,
        patchram.device_name()?
    );

    let connections = profile.connection_table();
    for (index, address) in connections.enumerate().enumerate() {
        info!("connection {:2} at {}", index, address);
    }

    let code = match &args.code {
        Some(path) => std::fs::read(path)?,
        None => RETURN_STUB.to_vec(),
    };
    let hook = HookDescriptor {
        entry_address: args.entry.unwrap_or(CYW27035B1_LMP_HOOK_ADDRESS),
        code,
        code_base: args.code_base.unwrap_or(CYW27035B1_LMP_CODE_BASE),
        side_data: LmpTableEntry {
            handler: LMP_SEND_HANDLER,
            length: LMP_PACKET_LENGTH,
        }
        .into(),
    };

    let plan = HookInjectionBuilder::new(&profile, args.window).build(&hook)?;
    info!(
        "placing {} bytes of code at {} and the table entry at {}",
        plan.code.len(),
        plan.code.address,
        plan.side_data.address
    );

    let slot = patchram.install_hook(&plan)?;
    patchram.enable(slot)?;

    for entry in patchram.read_device_state()?.iter().filter(|entry| entry.enabled) {
        println!(
            "{}: {} -> {:02x?}",
            entry.index, entry.target, entry.value
        );
    }

    patchram.unpatch(slot)?;
    info!("hook removed, slot {} is free again", slot);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::builder()
        .format(|buf, record| writeln!(buf, "[{:<5}] {}", record.level(), record.args()))
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
