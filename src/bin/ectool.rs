//! Operator CLI for the EtherCAT master (§6, Module L): a thin command-line front end over
//! [`ethercat_master::master::Master`], grounded in the spirit of `examples/kajity-ecdump`'s
//! single-binary-per-interface tools but dispatched through `clap` subcommands the way a real
//! fieldbus operator tool (`ethercat`, CherryECAT's `ec_cmd`) exposes them.
//!
//! Every subcommand opens its own raw-socket session against `--iface` rather than talking to a
//! long-running daemon — this crate has no IPC layer (out of scope, §1 Non-goals), so `ectool`
//! is the process that owns the `Master` for the duration of one invocation. `start` is the
//! exception: it runs the cyclic loop until interrupted.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ethercat_master::command::Command;
use ethercat_master::config::MasterConfig;
use ethercat_master::datagram::Datagram;
use ethercat_master::master::{periodic_tick, ExtDatagramOutcome, Master};
use ethercat_master::slave::{AlState, Slave};
use ethercat_master::transport::RawSocketDriver;

const MAX_NETDEVS: usize = 1;
const MAX_SLAVES: usize = 64;
const MAX_DATAGRAMS: usize = 64;
const MAX_PDO_BUFSIZE: usize = 4096;

type M = Master<RawSocketDriver, MAX_NETDEVS, MAX_SLAVES, MAX_DATAGRAMS, MAX_PDO_BUFSIZE>;

/// One invocation's exchange timeout: generous compared to the core's own 50 ms datagram
/// timeout, since this also absorbs the CLI process's own scheduling jitter.
const EXCHANGE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "ectool", about = "Operate and inspect an EtherCAT master", version)]
struct Cli {
    /// Network interface the master's (only) link is bound to.
    #[arg(short, long, default_value = "eth0")]
    iface: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the master into OPERATION and run the cyclic loop until interrupted.
    Start {
        /// Cycle time, in microseconds.
        #[arg(long, default_value_t = 1000)]
        cycle_us: u64,
    },
    /// Request PreOp on every slave and stop cyclic exchange (best-effort, §4.E).
    Stop,
    /// Print the master's phase, slave count and working-counter summary.
    Master,
    /// Request a rescan on the next scan cycle.
    Rescan,
    /// List slaves discovered by a broadcast probe.
    Slaves(SlavesArgs),
    /// Print each slave's PDO arena placement.
    Pdos,
    /// Request an AL state transition.
    States(StatesArgs),
    /// Read CoE mailbox bytes (raw payload, no object dictionary semantics — §1 Non-goals).
    CoeRead(MailboxArgs),
    /// Write CoE mailbox bytes.
    CoeWrite(MailboxWriteArgs),
    /// Read FoE mailbox bytes.
    FoeRead(MailboxArgs),
    /// Write FoE mailbox bytes.
    FoeWrite(MailboxWriteArgs),
    /// Queue the EoE mailbox datagram that brings up Ethernet-over-EtherCAT tunneling.
    EoeStart(PositionArgs),
    /// Read raw bytes from the logical PDO arena.
    PdoRead(PdoReadArgs),
    /// Write raw bytes into the logical PDO arena.
    PdoWrite(PdoWriteArgs),
    /// Read one SII (EEPROM) word.
    SiiRead(SiiReadArgs),
    /// Write one SII (EEPROM) word.
    SiiWrite(SiiWriteArgs),
    /// Print per-link working-counter and loss statistics.
    Wc,
    /// Print cycle-time and DC diagnostics.
    Perf(PerfArgs),
}

#[derive(Args)]
struct SlavesArgs {
    /// Restrict to one slave's ring position.
    #[arg(short = 'p', long)]
    position: Option<u16>,
    /// Print AL state and DC propagation delay alongside the address.
    #[arg(short, long)]
    verbose: bool,
}

/// `states <hex-state>` (3 argv) or `states -p <idx> <hex-state>` (5 argv). Modeled as a clap
/// struct rather than manual argv indexing, which would risk an out-of-bounds read past a
/// 3-argument form's declared slots; `clap`'s derive parser enforces the declared shape instead,
/// so a malformed argc surfaces as its own usage error.
#[derive(Args)]
struct StatesArgs {
    #[arg(short = 'p', long)]
    position: Option<u16>,
    /// Requested AL state as a hex status code (e.g. `8` for OP).
    hex_state: String,
}

#[derive(Args)]
struct PositionArgs {
    position: u16,
}

#[derive(Args)]
struct MailboxArgs {
    position: u16,
    /// Bytes to read.
    #[arg(default_value_t = 32)]
    len: usize,
}

#[derive(Args)]
struct MailboxWriteArgs {
    position: u16,
    /// Hex-encoded bytes, e.g. `0102ff`.
    data: String,
}

#[derive(Args)]
struct PdoReadArgs {
    logical_address: u32,
    len: usize,
}

#[derive(Args)]
struct PdoWriteArgs {
    logical_address: u32,
    data: String,
}

#[derive(Args)]
struct SiiReadArgs {
    position: u16,
    word_address: u16,
}

#[derive(Args)]
struct SiiWriteArgs {
    position: u16,
    word_address: u16,
    value: u16,
}

#[derive(Args)]
struct PerfArgs {
    /// Print send/recv execution time and cycle period stats.
    #[arg(short = 's')]
    send: bool,
    /// Print DC offset and controller integral.
    #[arg(short = 'd')]
    dc: bool,
    /// Verbose: print everything.
    #[arg(short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let cycle_time_ns = match &cli.command {
        Commands::Start { cycle_us } => cycle_us.saturating_mul(1_000),
        _ => 1_000_000,
    };

    let driver = RawSocketDriver::open(&cli.iface).with_context(|| format!("opening {}", cli.iface))?;
    let mut master: M = Master::new(MasterConfig::new(cycle_time_ns), [driver]);

    match cli.command {
        Commands::Start { cycle_us } => cmd_start(master, cycle_us),
        Commands::Stop => cmd_stop(&mut master),
        Commands::Master => cmd_master(&mut master),
        Commands::Rescan => cmd_rescan(&mut master),
        Commands::Slaves(args) => cmd_slaves(&mut master, args),
        Commands::Pdos => cmd_pdos(&mut master),
        Commands::States(args) => cmd_states(&mut master, args),
        Commands::CoeRead(args) => cmd_mailbox_read(&mut master, args, "CoE"),
        Commands::CoeWrite(args) => cmd_mailbox_write(&mut master, args, "CoE"),
        Commands::FoeRead(args) => cmd_mailbox_read(&mut master, args, "FoE"),
        Commands::FoeWrite(args) => cmd_mailbox_write(&mut master, args, "FoE"),
        Commands::EoeStart(args) => cmd_eoe_start(&mut master, args),
        Commands::PdoRead(args) => cmd_pdo_read(&mut master, args),
        Commands::PdoWrite(args) => cmd_pdo_write(&mut master, args),
        Commands::SiiRead(args) => cmd_sii_read(&mut master, args),
        Commands::SiiWrite(args) => cmd_sii_write(&mut master, args),
        Commands::Wc => cmd_wc(&mut master),
        Commands::Perf(args) => cmd_perf(&mut master, args),
    }
}

/// Probe the ring once via broadcast read of the AL status register (offset `0x0130`); the
/// reply's working counter is the number of slaves that saw the frame. Full chain-walking
/// discovery (addresses, vendor IDs, SII contents) is a Non-goal (§1) — this is only enough to
/// size a scan for the diagnostic commands below.
fn probe_slave_count(master: &mut M) -> Result<u16> {
    let slot = master.queue_ext_datagram(Datagram::brd(0x0130, 1, 0)).context("datagram arena full")?;
    let outcome = exchange(master, slot)?;
    let wc = match outcome {
        ExtDatagramOutcome::Ok | ExtDatagramOutcome::WorkingCounterError => {
            master.datagram(slot).map(|dg| dg.working_counter()).unwrap_or(0)
        }
        ExtDatagramOutcome::Timeout => 0,
        _ => bail!("broadcast probe failed: {outcome:?}"),
    };
    master.free(slot);
    Ok(wc)
}

/// Build a minimal slave table sized by [`probe_slave_count`] — placeholder entries at
/// auto-increment positions 0..count, each with no PDO mapping. Real vendor/PDO configuration is
/// left to an external `Scanner` (§4.G); this only gives the diagnostic commands something to
/// enumerate.
fn quick_scan(master: &mut M) -> Result<u16> {
    let count = probe_slave_count(master)?;
    let mut slaves: [Option<Slave>; MAX_SLAVES] = core::array::from_fn(|_| None);
    for i in 0..(count as usize).min(MAX_SLAVES) {
        slaves[i] = Some(Slave::new(0x1000 + i as u16));
    }
    master.set_slaves(slaves, (count as usize).min(MAX_SLAVES), None);
    Ok(count)
}

/// Queue `dg`, pumping `send`/`receive` against the real link until it resolves or
/// [`EXCHANGE_TIMEOUT`] elapses.
fn exchange(master: &mut M, slot: u8) -> Result<ExtDatagramOutcome> {
    let started = Instant::now();
    let mut buf = [0u8; ethercat_master::frame::ETHERNET_MTU];

    loop {
        let now_ns = started.elapsed().as_nanos() as u64;
        master.send(now_ns);

        if let Some(driver) = master.netdev_driver_mut(0) {
            while let Some(n) = driver.recv_frame(&mut buf) {
                master.receive(0, &buf[..n], now_ns);
            }
        }

        match master.ext_datagram_outcome(slot) {
            ExtDatagramOutcome::Unknown if started.elapsed() < EXCHANGE_TIMEOUT => {
                std::thread::sleep(Duration::from_millis(1));
            }
            outcome => return Ok(outcome),
        }
    }
}

/// Queue a one-shot datagram, wait for it to resolve, then free its slot. Returns the reply
/// payload for read commands.
fn exchange_datagram(master: &mut M, dg: Datagram) -> Result<(ExtDatagramOutcome, heapless::Vec<u8, 256>)> {
    let slot = master.queue_ext_datagram(dg).context("datagram arena full")?;
    let outcome = exchange(master, slot)?;
    let mut out = heapless::Vec::new();
    if let Some(bytes) = master.datagram(slot).and_then(|dg| dg.owned_data()) {
        let _ = out.extend_from_slice(&bytes[..bytes.len().min(out.capacity())]);
    }
    master.free(slot);
    Ok((outcome, out))
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        bail!("hex string must have an even number of digits");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.into()))
        .collect()
}

fn cmd_start(mut master: M, cycle_us: u64) -> Result<()> {
    let count = quick_scan(&mut master)?;
    println!("scanned {count} slave(s), entering OPERATION on cycle {cycle_us}us");

    master.start().context("failed to enter OPERATION")?;

    let running = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, std::sync::atomic::Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    let started = Instant::now();
    let cycle = Duration::from_micros(cycle_us);
    let mut buf = [0u8; ethercat_master::frame::ETHERNET_MTU];

    while running.load(std::sync::atomic::Ordering::SeqCst) {
        let tick_start = Instant::now();
        let now_ns = started.elapsed().as_nanos() as u64;

        periodic_tick(&mut master, now_ns);

        if let Some(driver) = master.netdev_driver_mut(0) {
            while let Some(n) = driver.recv_frame(&mut buf) {
                master.receive(0, &buf[..n], now_ns);
            }
        }
        master.record_send_exec_ns(tick_start.elapsed().as_nanos() as u64);

        if let Some(remaining) = cycle.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    master.stop(|ms| std::thread::sleep(Duration::from_millis(ms as u64)));
    println!("stopped");
    Ok(())
}

fn cmd_stop(master: &mut M) -> Result<()> {
    master.stop(|ms| std::thread::sleep(Duration::from_millis(ms as u64)));
    println!("requested PreOp on {} slave(s)", master.slave_count());
    Ok(())
}

fn cmd_master(master: &mut M) -> Result<()> {
    let count = quick_scan(master)?;
    println!("phase:     {:?}", master.phase());
    println!("slaves:    {count}");
    println!("link up:   {}", master.netdev_link_up(0).unwrap_or(false));
    println!("expect wc: {}", master.expected_working_counter());
    println!("actual wc: {}", master.actual_working_counter());
    Ok(())
}

fn cmd_rescan(master: &mut M) -> Result<()> {
    master.request_rescan();
    println!("rescan requested (pending == {})", master.rescan_requested());
    Ok(())
}

fn cmd_slaves(master: &mut M, args: SlavesArgs) -> Result<()> {
    quick_scan(master)?;

    let range = match args.position {
        Some(p) => p as usize..(p as usize + 1),
        None => 0..master.slave_count(),
    };

    for i in range {
        let Some(slave) = master.slave(i) else { continue };
        if args.verbose {
            println!(
                "{i}: addr=0x{:04x} state={:?}->{:?} dc_delay={}ns mailbox={:?}",
                slave.configured_address,
                slave.current_state,
                slave.requested_state,
                slave.transmission_delay,
                slave.mailbox_protocols
            );
        } else {
            println!("{i}: addr=0x{:04x}", slave.configured_address);
        }
    }
    Ok(())
}

fn cmd_pdos(master: &mut M) -> Result<()> {
    quick_scan(master)?;
    for i in 0..master.slave_count() {
        let Some(slave) = master.slave(i) else { continue };
        println!(
            "{i}: logical_start=0x{:06x} odata={}B idata={}B wc={}",
            slave.logical_start_address, slave.odata_size, slave.idata_size, slave.expected_working_counter
        );
    }
    Ok(())
}

fn cmd_states(master: &mut M, args: StatesArgs) -> Result<()> {
    let code = u8::from_str_radix(args.hex_state.trim_start_matches("0x"), 16)
        .with_context(|| format!("'{}' is not a valid hex AL status code", args.hex_state))?;
    let Some(state) = AlState::from_status(code) else { bail!("unrecognized AL state code 0x{code:02x}") };

    quick_scan(master)?;
    let targets: Vec<usize> = match args.position {
        Some(p) => vec![p as usize],
        None => (0..master.slave_count()).collect(),
    };

    for i in targets {
        if let Some(slave) = master.slave_mut(i) {
            slave.requested_state = state;
            println!("{i}: requested {state:?}");
        }
    }
    Ok(())
}

fn cmd_mailbox_read(master: &mut M, args: MailboxArgs, protocol: &str) -> Result<()> {
    let quick_scan_count = quick_scan(master)?;
    if args.position >= quick_scan_count {
        bail!("no slave at position {}", args.position);
    }

    let configured_address = master.slave(args.position as usize).map(|s| s.configured_address).unwrap_or(0x1000);
    let dg = Datagram::fprd(configured_address, 0x1000, args.len, 0);
    let (outcome, bytes) = exchange_datagram(master, dg)?;
    println!("{protocol} read from slave {} -> {outcome:?}: {:02x?}", args.position, bytes.as_slice());
    Ok(())
}

fn cmd_mailbox_write(master: &mut M, args: MailboxWriteArgs, protocol: &str) -> Result<()> {
    quick_scan(master)?;
    let data = parse_hex_bytes(&args.data)?;
    let configured_address = master.slave(args.position as usize).map(|s| s.configured_address).unwrap_or(0x1000);
    let dg = Datagram::fpwr(configured_address, 0x1000, &data, 0);
    let (outcome, _) = exchange_datagram(master, dg)?;
    println!("{protocol} write to slave {} -> {outcome:?}", args.position);
    Ok(())
}

fn cmd_eoe_start(master: &mut M, args: PositionArgs) -> Result<()> {
    quick_scan(master)?;
    let configured_address = master.slave(args.position as usize).map(|s| s.configured_address).unwrap_or(0x1000);
    // EoE init is, like every other mailbox protocol, just a queued datagram from the core's
    // point of view (§4.G) — the frame's contents are an external collaborator's concern.
    let dg = Datagram::fpwr(configured_address, 0x1000, &[0x02, 0x00], 0);
    let (outcome, _) = exchange_datagram(master, dg)?;
    println!("EoE start on slave {} -> {outcome:?}", args.position);
    Ok(())
}

/// Unlike the cyclic task's own LRW datagrams (arena-backed, §4.B), a one-shot diagnostic read
/// carries its own owned buffer — there is no PDO arena window to borrow outside `Operation`.
fn cmd_pdo_read(master: &mut M, args: PdoReadArgs) -> Result<()> {
    let dg = Datagram::init(Command::Lrw { logical_address: args.logical_address }, 0, args.len);
    let (outcome, bytes) = exchange_datagram(master, dg)?;
    println!("pdo_read 0x{:06x} -> {outcome:?}: {:02x?}", args.logical_address, bytes.as_slice());
    Ok(())
}

fn cmd_pdo_write(master: &mut M, args: PdoWriteArgs) -> Result<()> {
    let data = parse_hex_bytes(&args.data)?;
    let dg = Datagram::owned(Command::Lrw { logical_address: args.logical_address }, 0, &data);
    let (outcome, _) = exchange_datagram(master, dg)?;
    println!("pdo_write 0x{:06x} -> {outcome:?}", args.logical_address);
    Ok(())
}

fn cmd_sii_read(master: &mut M, args: SiiReadArgs) -> Result<()> {
    quick_scan(master)?;
    let configured_address = master.slave(args.position as usize).map(|s| s.configured_address).unwrap_or(0x1000);
    let dg = Datagram::fprd(configured_address, args.word_address, 2, 0);
    let (outcome, bytes) = exchange_datagram(master, dg)?;
    let value = if bytes.len() == 2 { u16::from_le_bytes([bytes[0], bytes[1]]) } else { 0 };
    println!("sii[{:#06x}] on slave {} -> {outcome:?}: 0x{value:04x}", args.word_address, args.position);
    Ok(())
}

fn cmd_sii_write(master: &mut M, args: SiiWriteArgs) -> Result<()> {
    quick_scan(master)?;
    let configured_address = master.slave(args.position as usize).map(|s| s.configured_address).unwrap_or(0x1000);
    let dg = Datagram::fpwr(configured_address, args.word_address, &args.value.to_le_bytes(), 0);
    let (outcome, _) = exchange_datagram(master, dg)?;
    println!("sii[{:#06x}] on slave {} <- 0x{:04x}: {outcome:?}", args.word_address, args.position, args.value);
    Ok(())
}

fn cmd_wc(master: &mut M) -> Result<()> {
    quick_scan(master)?;
    let stats = master.netdev_stats(0).context("no net-device")?;
    // §9 design note / Module L: displayed loss discounts the one unanswered probe frame that
    // `quick_scan` itself just sent; `stats.loss()` stays untouched.
    println!("expect wc: {}", master.expected_working_counter());
    println!("actual wc: {}", master.actual_working_counter());
    println!("loss:      {}", stats.loss().saturating_sub(1));
    println!("timeouts:  {}", stats.timeouts);
    println!("unmatched: {}", stats.unmatched);
    println!("corrupted: {}", stats.corrupted);
    Ok(())
}

fn cmd_perf(master: &mut M, args: PerfArgs) -> Result<()> {
    let perf = master.perf();
    let show_send = args.send || args.verbose;
    let show_dc = args.dc || args.verbose;
    let show_all = !args.send && !args.dc || args.verbose;

    if show_all {
        println!("period:   min={}ns max={}ns avg={}ns", perf.min_period_ns, perf.max_period_ns, perf.avg_period_ns);
    }
    if show_send {
        println!("send:     {}ns", perf.send_exec_ns);
        println!("recv:     {}ns", perf.recv_exec_ns);
    }
    if show_dc {
        println!("dc offset: {}ns", perf.dc_offset_ns);
        println!("dc integral: {}", master.dc_integral());
    }
    Ok(())
}
