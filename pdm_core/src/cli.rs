//! Serial command-line processor.
//!
//! Newline-terminated, space-separated tokens; numeric arguments accept
//! decimal or `0x`-prefixed hex where node/CoB identifiers are
//! involved. Every response begins `OK:` or `ERR:`; validation failures
//! leave all state untouched.

use pdm_common::config::CAN_BIT_RATES;
use pdm_common::types::{ChannelFaults, InputMode, LedState, OutputMode, CHANNEL_COUNT, MAX_GROUP};

use crate::adapters::{CanBus, ConfigStore};
use crate::config::{load_config, save_config};
use crate::cycle::Controller;
use crate::thermal::celsius_from_tmp235;

/// Process one command line. `now_ms` feeds the uptime display.
pub fn process_line(
    ctrl: &mut Controller,
    store: &mut dyn ConfigStore,
    can: &mut dyn CanBus,
    now_ms: u64,
    line: &str,
) -> String {
    let mut tokens = line.split_whitespace();
    let cmd = match tokens.next() {
        Some(c) => c,
        None => return String::new(),
    };
    let a1 = tokens.next();
    let a2 = tokens.next();

    match cmd {
        "OC" => set_channel_amps(ctrl, a1, a2, "OC", |c, v| c.oc_threshold_a = v),
        "INRUSH" => set_channel_amps(ctrl, a1, a2, "INR", |c, v| c.inrush_threshold_a = v),
        "INRUSHTIME" => {
            let (ch, ms) = match (parse_channel(a1), a2.and_then(parse_int)) {
                (Some(ch), Some(ms)) => (ch, ms),
                _ => return "ERR: INRUSHTIME <ch> <ms>".to_string(),
            };
            ctrl.config.channels[ch].inrush_time_ms = ms;
            format!("OK: CH{} INRtime={ms} ms", ch + 1)
        }
        "UNDERWARN" => set_channel_amps(ctrl, a1, a2, "UWR", |c, v| c.under_warn_a = v),
        "TEMPWARN" => match a1.and_then(parse_float) {
            Some(v) if v.is_finite() => {
                ctrl.config.temp_warn_c = v;
                format!("OK: TempWarn={v:.1} C")
            }
            _ => "ERR: TEMPWARN <celsius>".to_string(),
        },
        "TEMPTRIP" => match a1.and_then(parse_float) {
            Some(v) if v.is_finite() => {
                ctrl.config.temp_trip_c = v;
                format!("OK: TempTrip={v:.1} C")
            }
            _ => "ERR: TEMPTRIP <celsius>".to_string(),
        },
        "MODE" => {
            let ch = match parse_channel(a1) {
                Some(ch) => ch,
                None => return "ERR: MODE <ch> LATCH|MOMENTARY".to_string(),
            };
            let mode = match a2 {
                Some("LATCH") => OutputMode::Latch,
                Some("MOMENTARY") => OutputMode::Momentary,
                _ => return "ERR: MODE <ch> LATCH|MOMENTARY".to_string(),
            };
            ctrl.config.channels[ch].mode = mode;
            format!(
                "OK: CH{} Mode={}",
                ch + 1,
                if mode == OutputMode::Latch { "LATCH" } else { "MOMENTARY" }
            )
        }
        "GROUP" => {
            let (ch, g) = match (parse_channel(a1), a2.and_then(parse_int)) {
                (Some(ch), Some(g)) => (ch, g),
                _ => return "ERR: GROUP <ch> <n>".to_string(),
            };
            if g == 0 || g > MAX_GROUP as u32 {
                return format!("ERR: group must be 1..={MAX_GROUP}");
            }
            ctrl.config.channels[ch].group = g as u8;
            format!("OK: CH{} Group={g}", ch + 1)
        }
        "CANSPEED" => match a1.and_then(parse_int) {
            Some(kbps) if CAN_BIT_RATES.contains(&(kbps as u16)) => {
                ctrl.config.can_kbps = kbps as u16;
                can.set_bitrate(kbps as u16);
                format!("OK: CAN speed={kbps} kbps")
            }
            _ => "ERR: CANSPEED 125|250|500|1000".to_string(),
        },
        "NODEID" => {
            let id = match a2.and_then(parse_int) {
                Some(id) if id <= 0x7F => id as u8,
                _ => return "ERR: NODEID PDM|KEYPAD <hex|dec>".to_string(),
            };
            match a1 {
                Some("PDM") => {
                    ctrl.config.pdm_node_id = id;
                    format!("OK: PDM NodeID=0x{id:02X}")
                }
                Some("KEYPAD") => {
                    ctrl.config.keypad_node_id = id;
                    format!("OK: Keypad NodeID=0x{id:02X}")
                }
                _ => "ERR: NODEID PDM|KEYPAD <hex|dec>".to_string(),
            }
        }
        "DIGOUT" => match a1.and_then(parse_int) {
            Some(id) if id <= 0x7FF => {
                ctrl.config.digout_cob_id = id as u16;
                format!("OK: DigitalOut COBID=0x{id:03X}")
            }
            _ => "ERR: DIGOUT <hex|dec>".to_string(),
        },
        "LOG" => match a1 {
            None => format!("OK: log level is {}", ctrl.log_verbosity()),
            Some(s) => match s.parse::<u8>() {
                Ok(level) if level <= 2 => {
                    ctrl.set_log_verbosity(level);
                    format!("OK: log level {level}")
                }
                _ => "ERR: LOG 0|1|2 (0=normal, 1=state changes, 2=+CAN)".to_string(),
            },
        },
        "SHOW" | "PRINT" => render_config(ctrl),
        "STATUS" => render_status(ctrl, now_ms),
        "TEMPDETAIL" => render_temp_detail(ctrl),
        "SAVE" => match save_config(store, &ctrl.config) {
            Ok(crc) => format!("OK: configuration saved (CRC=0x{crc:04X})"),
            Err(e) => format!("ERR: {e}"),
        },
        "LOAD" => match load_config(store) {
            Ok(loaded) => {
                ctrl.config = loaded.config;
                format!("OK: configuration loaded (CRC=0x{:04X})", loaded.crc)
            }
            Err(e) => format!("ERR: {e}"),
        },
        "HELP" | "?" => render_help(),
        other => format!("ERR: unknown command '{other}' (HELP for commands)"),
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn parse_int(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn parse_float(s: &str) -> Option<f32> {
    s.parse().ok()
}

/// Channels are 1-based on the wire.
fn parse_channel(s: Option<&str>) -> Option<usize> {
    let n: usize = s?.parse().ok()?;
    (1..=CHANNEL_COUNT).contains(&n).then(|| n - 1)
}

fn set_channel_amps(
    ctrl: &mut Controller,
    a1: Option<&str>,
    a2: Option<&str>,
    label: &str,
    apply: impl FnOnce(&mut pdm_common::config::ChannelConfig, f32),
) -> String {
    let (ch, amps) = match (parse_channel(a1), a2.and_then(parse_float)) {
        (Some(ch), Some(v)) if v.is_finite() && v >= 0.0 => (ch, v),
        _ => return format!("ERR: {label} needs <ch 1..4> <amps>"),
    };
    apply(&mut ctrl.config.channels[ch], amps);
    format!("OK: CH{} {label}={amps:.2} A", ch + 1)
}

// ─── Renders ────────────────────────────────────────────────────────

fn render_config(ctrl: &Controller) -> String {
    let mut out = String::from("OK: configuration\n");
    for (ch, c) in ctrl.config.channels.iter().enumerate() {
        out.push_str(&format!(
            "CH{}: OC={:.2}A, INR={:.2}A/{}ms, UWR={:.2}A, Mode={}, Grp={}\n",
            ch + 1,
            c.oc_threshold_a,
            c.inrush_threshold_a,
            c.inrush_time_ms,
            c.under_warn_a,
            if c.mode == OutputMode::Latch { "L" } else { "M" },
            c.group,
        ));
    }
    out.push_str(&format!("TempWarn={:.1} C\n", ctrl.config.temp_warn_c));
    out.push_str(&format!("TempTrip={:.1} C\n", ctrl.config.temp_trip_c));
    out.push_str(&format!("CAN Speed={} kbps\n", ctrl.config.can_kbps));
    out.push_str(&format!("PDM NodeID=0x{:02X}\n", ctrl.config.pdm_node_id));
    out.push_str(&format!("Keypad NodeID=0x{:02X}\n", ctrl.config.keypad_node_id));
    out.push_str(&format!("DigitalOut COBID=0x{:03X}", ctrl.config.digout_cob_id));
    out
}

fn render_status(ctrl: &Controller, now_ms: u64) -> String {
    let mut out = String::from("OK: status\n");
    out.push_str(&format!("Uptime: {} s\n", now_ms / 1000));
    out.push_str(&format!(
        "Last Input: {}\n",
        match ctrl.arbiter.last_input_mode() {
            InputMode::None => "NONE",
            InputMode::Digital => "DIGITAL BUTTONS",
            InputMode::CanKeypad => "CAN KEYPAD",
            InputMode::CanDigout => "CAN DIGITAL OUTPUT",
        }
    ));
    out.push_str(&format!(
        "Keypad Link: {}\n",
        if ctrl.liveness.keypad_ok() { "OK" } else { "TIMEOUT" }
    ));
    if ctrl.liveness.digout_watchdog_triggered() {
        out.push_str("DIGOUT Watchdog: TRIGGERED\n");
    }
    out.push_str(&format!("Battery: {:.2} V\n", ctrl.last_battery_v()));
    if ctrl.thermal.sensor_error() {
        out.push_str("Temperature: SENSOR ERROR\n");
    } else {
        out.push_str(&format!("Temperature: {:.1} C\n", ctrl.thermal.filtered_c()));
    }
    out.push_str("CH | State | Current | Mode | Grp | LED      | Flags\n");
    let currents = ctrl.last_currents_a();
    for ch in 0..CHANNEL_COUNT {
        let s = &ctrl.bank.channels[ch];
        let c = &ctrl.config.channels[ch];
        let mut flags = String::new();
        if s.faults.contains(ChannelFaults::OVERCURRENT) {
            flags.push_str("OVERCURRENT ");
        }
        if s.faults.contains(ChannelFaults::THERMAL) {
            flags.push_str("THERMAL ");
        }
        if s.warn_undercurrent {
            flags.push_str("UNDERCURRENT ");
        }
        if flags.is_empty() {
            flags.push_str("OK");
        }
        out.push_str(&format!(
            "{}  | {}   | {:.2} A  | {}    | {}   | {:<8} | {}\n",
            ch + 1,
            if s.active { "ON " } else { "OFF" },
            currents[ch],
            if c.mode == OutputMode::Latch { "L" } else { "M" },
            c.group,
            led_name(s.led),
            flags.trim_end(),
        ));
    }
    out.pop();
    out
}

fn led_name(led: LedState) -> &'static str {
    match led {
        LedState::Off => "OFF",
        LedState::Green => "GREEN",
        LedState::Blue => "BLUE",
        LedState::Amber => "AMBER",
        LedState::Red => "RED",
        LedState::RedFlash => "RED FLASH",
    }
}

fn render_temp_detail(ctrl: &Controller) -> String {
    let volts = ctrl.last_temp_volts();
    let mut out = String::from("OK: temperature detail\n");
    out.push_str(&format!("Sensor Voltage: {volts:.3} V\n"));
    out.push_str(&format!("Raw Temperature: {:.2} C\n", celsius_from_tmp235(volts)));
    out.push_str(&format!("Filtered Temperature: {:.2} C\n", ctrl.thermal.filtered_c()));
    out.push_str(&format!(
        "Sensor Error: {}\n",
        if ctrl.thermal.sensor_error() { "YES" } else { "NO" }
    ));
    out.push_str(&format!("Battery Voltage: {:.2} V", ctrl.last_battery_v()));
    out
}

fn render_help() -> String {
    concat!(
        "OK: commands\n",
        "OC <ch> <amps>            set overcurrent threshold\n",
        "INRUSH <ch> <amps>        set inrush threshold\n",
        "INRUSHTIME <ch> <ms>      set inrush window length\n",
        "UNDERWARN <ch> <amps>     set undercurrent warning\n",
        "TEMPWARN <c>              set temperature warning\n",
        "TEMPTRIP <c>              set temperature trip\n",
        "MODE <ch> LATCH|MOMENTARY set channel mode\n",
        "GROUP <ch> <n>            set channel group\n",
        "CANSPEED 125|250|500|1000 set CAN bit rate\n",
        "NODEID PDM|KEYPAD <id>    set node ids\n",
        "DIGOUT <id>               set digital-output CoB-ID\n",
        "LOG 0|1|2                 set log verbosity\n",
        "SHOW | PRINT              display configuration\n",
        "STATUS                    display system status\n",
        "TEMPDETAIL                temperature diagnostics\n",
        "SAVE | LOAD               persist / restore configuration\n",
        "HELP | ?                  this list"
    )
    .to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemStore, SimCanBus};
    use pdm_common::config::PdmConfig;

    fn setup() -> (Controller, MemStore, SimCanBus) {
        (
            Controller::new(PdmConfig::default()),
            MemStore::default(),
            SimCanBus::default(),
        )
    }

    fn run(ctrl: &mut Controller, store: &mut MemStore, can: &mut SimCanBus, line: &str) -> String {
        process_line(ctrl, store, can, 5000, line)
    }

    #[test]
    fn oc_command_sets_threshold() {
        let (mut ctrl, mut store, mut can) = setup();
        let r = run(&mut ctrl, &mut store, &mut can, "OC 2 4.5");
        assert_eq!(r, "OK: CH2 OC=4.50 A");
        assert_eq!(ctrl.config.channels[1].oc_threshold_a, 4.5);
    }

    #[test]
    fn bad_channel_is_rejected_without_side_effects() {
        let (mut ctrl, mut store, mut can) = setup();
        let before = ctrl.config.clone();
        assert!(run(&mut ctrl, &mut store, &mut can, "OC 5 4.5").starts_with("ERR:"));
        assert!(run(&mut ctrl, &mut store, &mut can, "OC 0 4.5").starts_with("ERR:"));
        assert!(run(&mut ctrl, &mut store, &mut can, "OC 1 -2").starts_with("ERR:"));
        assert_eq!(ctrl.config, before);
    }

    #[test]
    fn mode_and_group_commands() {
        let (mut ctrl, mut store, mut can) = setup();
        assert_eq!(
            run(&mut ctrl, &mut store, &mut can, "MODE 3 MOMENTARY"),
            "OK: CH3 Mode=MOMENTARY"
        );
        assert_eq!(ctrl.config.channels[2].mode, OutputMode::Momentary);

        assert_eq!(run(&mut ctrl, &mut store, &mut can, "GROUP 3 1"), "OK: CH3 Group=1");
        assert_eq!(ctrl.config.channels[2].group, 1);

        assert!(run(&mut ctrl, &mut store, &mut can, "GROUP 3 9").starts_with("ERR:"));
        assert!(run(&mut ctrl, &mut store, &mut can, "MODE 3 SOMETIMES").starts_with("ERR:"));
    }

    #[test]
    fn canspeed_reconfigures_the_bus() {
        let (mut ctrl, mut store, mut can) = setup();
        assert_eq!(
            run(&mut ctrl, &mut store, &mut can, "CANSPEED 500"),
            "OK: CAN speed=500 kbps"
        );
        assert_eq!(can.bitrate_kbps, 500);
        assert_eq!(ctrl.config.can_kbps, 500);

        assert!(run(&mut ctrl, &mut store, &mut can, "CANSPEED 300").starts_with("ERR:"));
        assert_eq!(ctrl.config.can_kbps, 500, "invalid speed leaves state alone");
    }

    #[test]
    fn nodeid_and_digout_accept_hex() {
        let (mut ctrl, mut store, mut can) = setup();
        assert_eq!(
            run(&mut ctrl, &mut store, &mut can, "NODEID KEYPAD 0x21"),
            "OK: Keypad NodeID=0x21"
        );
        assert_eq!(ctrl.config.keypad_node_id, 0x21);

        assert_eq!(
            run(&mut ctrl, &mut store, &mut can, "DIGOUT 0x6A0"),
            "OK: DigitalOut COBID=0x6A0"
        );
        assert_eq!(ctrl.config.digout_cob_id, 0x6A0);

        assert!(run(&mut ctrl, &mut store, &mut can, "NODEID PDM 0x100").starts_with("ERR:"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let (mut ctrl, mut store, mut can) = setup();
        run(&mut ctrl, &mut store, &mut can, "OC 1 9.5");
        let saved = run(&mut ctrl, &mut store, &mut can, "SAVE");
        assert!(saved.starts_with("OK: configuration saved"), "got: {saved}");

        run(&mut ctrl, &mut store, &mut can, "OC 1 1.0");
        let loaded = run(&mut ctrl, &mut store, &mut can, "LOAD");
        assert!(loaded.starts_with("OK: configuration loaded"), "got: {loaded}");
        assert_eq!(ctrl.config.channels[0].oc_threshold_a, 9.5);
    }

    #[test]
    fn load_from_empty_store_is_an_error_line() {
        let (mut ctrl, mut store, mut can) = setup();
        let r = run(&mut ctrl, &mut store, &mut can, "LOAD");
        assert!(r.starts_with("ERR:"), "got: {r}");
    }

    #[test]
    fn corrupt_store_load_keeps_current_config() {
        let (mut ctrl, mut store, mut can) = setup();
        run(&mut ctrl, &mut store, &mut can, "OC 1 9.5");
        run(&mut ctrl, &mut store, &mut can, "SAVE");

        let mut blob = store.blob().unwrap().to_vec();
        blob[12] ^= 0xFF;
        let mut corrupt = MemStore::with_blob(blob);

        run(&mut ctrl, &mut store, &mut can, "OC 1 2.0");
        let r = run(&mut ctrl, &mut corrupt, &mut can, "LOAD");
        assert!(r.starts_with("ERR:") && r.contains("CRC"), "got: {r}");
        assert_eq!(ctrl.config.channels[0].oc_threshold_a, 2.0, "config untouched");
    }

    #[test]
    fn log_level_roundtrip() {
        let (mut ctrl, mut store, mut can) = setup();
        assert_eq!(run(&mut ctrl, &mut store, &mut can, "LOG 2"), "OK: log level 2");
        assert_eq!(ctrl.log_verbosity(), 2);
        assert_eq!(run(&mut ctrl, &mut store, &mut can, "LOG"), "OK: log level is 2");
        assert!(run(&mut ctrl, &mut store, &mut can, "LOG 7").starts_with("ERR:"));
    }

    #[test]
    fn show_status_help_start_with_ok() {
        let (mut ctrl, mut store, mut can) = setup();
        for cmd in ["SHOW", "PRINT", "STATUS", "TEMPDETAIL", "HELP", "?"] {
            let r = run(&mut ctrl, &mut store, &mut can, cmd);
            assert!(r.starts_with("OK:"), "{cmd} → {r}");
        }
        let show = run(&mut ctrl, &mut store, &mut can, "SHOW");
        assert!(show.contains("CH1: OC=3.00A"));
        let status = run(&mut ctrl, &mut store, &mut can, "STATUS");
        assert!(status.contains("Uptime: 5 s"));
        assert!(status.contains("Last Input: NONE"));
    }

    #[test]
    fn unknown_command_is_an_error() {
        let (mut ctrl, mut store, mut can) = setup();
        let r = run(&mut ctrl, &mut store, &mut can, "FROB 1");
        assert!(r.starts_with("ERR: unknown command 'FROB'"), "got: {r}");
    }

    #[test]
    fn empty_line_is_silent() {
        let (mut ctrl, mut store, mut can) = setup();
        assert_eq!(run(&mut ctrl, &mut store, &mut can, "   "), "");
    }
}
