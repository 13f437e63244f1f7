use cia_timer::cia::{CIA_CRA, CIA_CRB, CIA_ICR, CIA_TAH, CIA_TAL, CIA_TBH, CIA_TBL};
use cia_timer::interrupt::IrqRecorder;
use cia_timer::{AlarmContext, AlarmToken, CiaTimers, Clock, TimerLatency};
use std::process;

// Runs the CIA timer block without a CPU and prints what the program would see.
// Usage:
//   cargo run --bin cia_trace -- <latch> [cycles] [--step N] [--one-shot] [--cascade] [--save FILE]
// Latencies can be overridden with CIA_TIMER_DELAY / CIA_ONESHOT_DELAY.

struct Args {
    latch: u16,
    cycles: Clock,
    step: Clock,
    one_shot: bool,
    cascade: bool,
    save: Option<String>,
}

fn parse_u32_hex_or_dec(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(stripped) = s.strip_prefix("0x") {
        u32::from_str_radix(stripped, 16).ok()
    } else {
        s.parse::<u32>().ok()
    }
}

fn usage() -> ! {
    eprintln!(
        "Usage: cia_trace <latch> [cycles] [--step N] [--one-shot] [--cascade] [--save FILE]"
    );
    process::exit(2);
}

fn parse_args() -> Args {
    let mut args = std::env::args().skip(1);
    let mut latch: Option<u16> = None;
    let mut cycles: Option<Clock> = None;
    let mut step: Clock = 1;
    let mut one_shot = false;
    let mut cascade = false;
    let mut save = None;

    while let Some(a) = args.next() {
        match a.as_str() {
            "--one-shot" | "--oneshot" => one_shot = true,
            "--cascade" => cascade = true,
            "--step" => match args.next().as_deref().and_then(parse_u32_hex_or_dec) {
                Some(n) if n > 0 => step = n as Clock,
                _ => usage(),
            },
            "--save" => match args.next() {
                Some(path) => save = Some(path),
                None => usage(),
            },
            "-h" | "--help" => usage(),
            _ => {
                let Some(n) = parse_u32_hex_or_dec(&a) else {
                    eprintln!("Not a number: {}", a);
                    usage();
                };
                if latch.is_none() {
                    if n > 0xFFFF {
                        eprintln!("Latch must fit in 16 bits: {}", a);
                        process::exit(2);
                    }
                    latch = Some(n as u16);
                } else if cycles.is_none() {
                    cycles = Some(n as Clock);
                } else {
                    usage();
                }
            }
        }
    }

    let Some(latch) = latch else { usage() };
    Args {
        latch,
        cycles: cycles.unwrap_or(200),
        step,
        one_shot,
        cascade,
        save,
    }
}

fn read_word(cia: &mut CiaTimers, lo: u8, hi: u8, clock: Clock) -> u16 {
    let lo = cia.read(lo, clock) as u16;
    let hi = cia.read(hi, clock) as u16;
    (hi << 8) | lo
}

fn main() {
    env_logger::init();
    let args = parse_args();

    let irq = IrqRecorder::new();
    let mut alarms = AlarmContext::new();
    let mut cia = CiaTimers::new(
        0,
        (AlarmToken(0), AlarmToken(1)),
        TimerLatency::from_env(),
        Box::new(irq.clone()),
    );

    let lo = (args.latch & 0xFF) as u8;
    let hi = (args.latch >> 8) as u8;
    let mode = if args.one_shot { 0x08 } else { 0x00 };
    cia.write(CIA_TAL, 0, lo, &mut alarms);
    cia.write(CIA_TAH, 0, hi, &mut alarms);
    if args.cascade {
        // B counts A underflows with the same latch; only B interrupts
        cia.write(CIA_TBL, 0, lo, &mut alarms);
        cia.write(CIA_TBH, 0, hi, &mut alarms);
        cia.write(CIA_ICR, 0, 0x82, &mut alarms);
        cia.write(CIA_CRB, 0, 0x41 | mode, &mut alarms);
        cia.write(CIA_CRA, 0, 0x01, &mut alarms);
    } else {
        cia.write(CIA_ICR, 0, 0x81, &mut alarms);
        cia.write(CIA_CRA, 0, 0x01 | mode, &mut alarms);
    }

    println!(
        "latch={:04X} cycles={} step={}{}{}",
        args.latch,
        args.cycles,
        args.step,
        if args.one_shot { " one-shot" } else { "" },
        if args.cascade { " cascade" } else { "" }
    );

    let mut clock: Clock = 0;
    let mut last = 0;
    while clock <= args.cycles {
        while let Some((token, target)) = alarms.pop_due(clock) {
            cia.alarm_fired(token, target, &mut alarms);
        }

        let ta = read_word(&mut cia, CIA_TAL, CIA_TAH, clock);
        let tb = read_word(&mut cia, CIA_TBL, CIA_TBH, clock);
        let irq_now = irq.is_active();
        let mut line = format!("{:8}  A={:04X} B={:04X}", clock, ta, tb);
        if irq_now {
            // acknowledge like an interrupt handler would
            let icr = cia.read(CIA_ICR, clock);
            line.push_str(&format!("  IRQ icr={:02X}", icr));
        }
        println!("{}", line);

        last = clock;
        clock += args.step;
    }

    println!(
        "irqs={} CRA={:02X} CRB={:02X}",
        irq.raised(),
        cia.read(CIA_CRA, last),
        cia.read(CIA_CRB, last)
    );

    if let Some(path) = args.save {
        let snap = cia.snapshot(last);
        if let Err(e) = snap.save_to_file(&path) {
            eprintln!("Failed to save snapshot: {}", e);
            process::exit(1);
        }
    }
}
