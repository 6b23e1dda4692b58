use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::{Session, SessionFactory, Vxi11Factory, Vxi11Session};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash)]
pub enum Channel {
    #[value(name = "1", alias = "CH1")]
    Ch1,
    #[value(name = "2", alias = "CH2")]
    Ch2,
    #[value(name = "3", alias = "CH3")]
    Ch3,
    #[value(name = "4", alias = "CH4")]
    Ch4,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Ch1, Channel::Ch2, Channel::Ch3, Channel::Ch4];

    pub fn number(self) -> u8 {
        match self {
            Channel::Ch1 => 1,
            Channel::Ch2 => 2,
            Channel::Ch3 => 3,
            Channel::Ch4 => 4,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Channel::Ch1),
            2 => Ok(Channel::Ch2),
            3 => Ok(Channel::Ch3),
            4 => Ok(Channel::Ch4),
            other => Err(Error::InvalidChannel(other.to_string())),
        }
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        let digits = upper.strip_prefix("CH").unwrap_or(&upper);
        let number: u8 = digits
            .parse()
            .map_err(|_| Error::InvalidChannel(s.to_string()))?;
        Channel::try_from(number).map_err(|_| Error::InvalidChannel(s.to_string()))
    }
}

/// A two-state setting reported by the meter as a `0`/`1` status code.
pub trait StatusCode: Sized + Copy {
    /// Command path below `SENS<ch>:`.
    const PATH: &'static str;
    /// Logged when the reply is not a known status code.
    const UNRECOGNIZED: &'static str;

    fn from_code(code: u8) -> Option<Self>;
    fn code(self) -> u8;
    fn current_label(self) -> &'static str;
    fn set_label(self) -> &'static str;
    fn set_failure(self) -> &'static str;
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PowerUnit {
    Dbm,
    Watt,
}

impl StatusCode for PowerUnit {
    const PATH: &'static str = "POW:UNIT";
    const UNRECOGNIZED: &'static str = "Units Set to Default (Watts)";

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PowerUnit::Dbm),
            1 => Some(PowerUnit::Watt),
            _ => None,
        }
    }

    fn code(self) -> u8 {
        match self {
            PowerUnit::Dbm => 0,
            PowerUnit::Watt => 1,
        }
    }

    fn current_label(self) -> &'static str {
        match self {
            PowerUnit::Dbm => "Current Units: dBm",
            PowerUnit::Watt => "Current Units: Watts",
        }
    }

    fn set_label(self) -> &'static str {
        match self {
            PowerUnit::Dbm => "Units Set To dBm",
            PowerUnit::Watt => "Units Set To Watts",
        }
    }

    fn set_failure(self) -> &'static str {
        match self {
            PowerUnit::Dbm => "Could Not Set Units To dBm",
            PowerUnit::Watt => "Could Not Set Units To Watts",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum MeasurementMode {
    Absolute,
    Relative,
}

impl StatusCode for MeasurementMode {
    const PATH: &'static str = "POW:REF:STAT";
    const UNRECOGNIZED: &'static str = "Current Measurement Mode Could Not Be Found";

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MeasurementMode::Absolute),
            1 => Some(MeasurementMode::Relative),
            _ => None,
        }
    }

    fn code(self) -> u8 {
        match self {
            MeasurementMode::Absolute => 0,
            MeasurementMode::Relative => 1,
        }
    }

    fn current_label(self) -> &'static str {
        match self {
            MeasurementMode::Absolute => "Current Measurement Mode: Absolute",
            MeasurementMode::Relative => "Current Measurement Mode: Relative",
        }
    }

    fn set_label(self) -> &'static str {
        match self {
            MeasurementMode::Absolute => "Measurement Mode Set to Absolute",
            MeasurementMode::Relative => "Measurement Mode Set to Relative",
        }
    }

    fn set_failure(self) -> &'static str {
        match self {
            MeasurementMode::Absolute => "Could Not Set Measurement Mode to Absolute",
            MeasurementMode::Relative => "Could Not Set Measurement Mode to Relative",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum RangingMode {
    Manual,
    Auto,
}

impl StatusCode for RangingMode {
    const PATH: &'static str = "POW:RANG:AUTO";
    const UNRECOGNIZED: &'static str = "Current Ranging Mode Could Not Be Found";

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RangingMode::Manual),
            1 => Some(RangingMode::Auto),
            _ => None,
        }
    }

    fn code(self) -> u8 {
        match self {
            RangingMode::Manual => 0,
            RangingMode::Auto => 1,
        }
    }

    fn current_label(self) -> &'static str {
        match self {
            RangingMode::Manual => "Current Ranging Mode: Manual",
            RangingMode::Auto => "Current Ranging Mode: Auto",
        }
    }

    fn set_label(self) -> &'static str {
        match self {
            RangingMode::Manual => "Ranging Mode Set to Manual",
            RangingMode::Auto => "Ranging Mode Set to Auto",
        }
    }

    fn set_failure(self) -> &'static str {
        match self {
            RangingMode::Manual => "Could Not Set Ranging Mode to Manual",
            RangingMode::Auto => "Could Not Set Ranging Mode to Auto",
        }
    }
}

/// What the convenience setters do when a command fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Return the failure to the caller.
    #[default]
    Propagate,
    /// Log the failure at `warn` and report success. Construction yields a
    /// disconnected meter instead of an error.
    LogAndContinue,
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    verbose: bool,
    show_output: bool,
    initial_channel: Channel,
    error_policy: ErrorPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            verbose: false,
            show_output: true,
            initial_channel: Channel::Ch1,
            error_policy: ErrorPolicy::Propagate,
        }
    }
}

impl Options {
    /// Log connection and identity messages at `info` instead of `debug`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Log status labels ("Current Units: dBm", ...) at `info` instead of `debug`.
    pub fn show_output(mut self, show_output: bool) -> Self {
        self.show_output = show_output;
        self
    }

    pub fn initial_channel(mut self, channel: Channel) -> Self {
        self.initial_channel = channel;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

/// Keysight N7744A four-channel optical power meter.
///
/// Convenience methods act on the selected channel, except the unit setters
/// which always address all four channels. The `*_on` methods take the
/// channel explicitly and leave the selection untouched.
pub struct N7744a<S: Session = Vxi11Session> {
    session: Option<S>,
    address: String,
    device_info: Option<String>,
    channel: Channel,
    options: Options,
}

impl N7744a<Vxi11Session> {
    pub async fn connect(address: &str) -> Result<Self> {
        Self::open(&Vxi11Factory::new(), address, Options::default()).await
    }

    pub async fn connect_with_timeout(address: &str, timeout: Duration) -> Result<Self> {
        Self::open(&Vxi11Factory::with_timeout(timeout), address, Options::default()).await
    }
}

impl<S: Session> N7744a<S> {
    /// Open a session to `address` and confirm something answers `*IDN?`.
    pub async fn open<F>(factory: &F, address: &str, options: Options) -> Result<Self>
    where
        F: SessionFactory<Session = S>,
    {
        let mut meter = Self {
            session: None,
            address: address.to_string(),
            device_info: None,
            channel: options.initial_channel,
            options,
        };

        let mut session = match factory.open(address).await {
            Ok(session) => {
                meter.announce("RESOURCE CONNECTED");
                session
            }
            Err(e) => {
                warn!("RESOURCE NOT CONNECTED: {address}: {e}");
                let err = match e {
                    Error::Connect { .. } | Error::InvalidAddress(_) => e,
                    other => Error::Connect {
                        address: address.to_string(),
                        source: anyhow::Error::from(other),
                    },
                };
                return meter.tolerate(err);
            }
        };

        match session.query("*IDN?").await {
            Ok(idn) => {
                meter.announce(&format!("CONNECTED TO: {idn}"));
                meter.device_info = Some(idn);
                meter.session = Some(session);
                Ok(meter)
            }
            Err(e) => {
                warn!("INCORRECT DEVICE CONNECTED: {address}: {e}");
                if let Err(close_err) = session.close().await {
                    debug!("closing after failed identify: {close_err}");
                }
                let err = Error::Identify {
                    address: address.to_string(),
                    source: Box::new(e),
                };
                meter.tolerate(err)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// The `*IDN?` reply captured when the session was opened.
    pub fn device_info(&self) -> Option<&str> {
        self.device_info.as_deref()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Close the session. The meter cannot be used afterwards; releasing an
    /// already released meter does nothing.
    pub async fn release(&mut self) -> Result<()> {
        match self.session.take() {
            Some(mut session) => session.close().await,
            None => Ok(()),
        }
    }

    pub fn set_channel(&mut self, channel: Channel) {
        self.channel = channel;
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub async fn identify(&mut self) -> Result<String> {
        let idn = self.query("*IDN?").await?;
        self.device_info = Some(idn.clone());
        Ok(idn)
    }

    pub async fn current_units(&mut self) -> Result<PowerUnit> {
        self.units_on(self.channel).await
    }

    pub async fn units_on(&mut self, channel: Channel) -> Result<PowerUnit> {
        self.query_status(channel).await
    }

    pub async fn set_units_on(&mut self, channel: Channel, unit: PowerUnit) -> Result<()> {
        self.write_status(channel, unit).await
    }

    /// Write `unit` to every channel in ascending order, stopping at the
    /// first failure.
    pub async fn set_units(&mut self, unit: PowerUnit) -> Result<()> {
        let mut result = Ok(());
        for channel in Channel::ALL {
            result = self.set_units_on(channel, unit).await;
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() {
            self.output(unit.set_label());
        }
        self.settle(result, unit.set_failure())
    }

    pub async fn set_units_dbm(&mut self) -> Result<()> {
        self.set_units(PowerUnit::Dbm).await
    }

    pub async fn set_units_watts(&mut self) -> Result<()> {
        self.set_units(PowerUnit::Watt).await
    }

    pub async fn current_measurement_mode(&mut self) -> Result<MeasurementMode> {
        self.measurement_mode_on(self.channel).await
    }

    pub async fn measurement_mode_on(&mut self, channel: Channel) -> Result<MeasurementMode> {
        self.query_status(channel).await
    }

    pub async fn set_measurement_mode_on(
        &mut self,
        channel: Channel,
        mode: MeasurementMode,
    ) -> Result<()> {
        self.write_status(channel, mode).await
    }

    pub async fn set_mmode_abs(&mut self) -> Result<()> {
        self.set_selected(MeasurementMode::Absolute).await
    }

    pub async fn set_mmode_rel(&mut self) -> Result<()> {
        self.set_selected(MeasurementMode::Relative).await
    }

    pub async fn current_ranging_mode(&mut self) -> Result<RangingMode> {
        self.ranging_mode_on(self.channel).await
    }

    pub async fn ranging_mode_on(&mut self, channel: Channel) -> Result<RangingMode> {
        self.query_status(channel).await
    }

    pub async fn set_ranging_mode_on(&mut self, channel: Channel, mode: RangingMode) -> Result<()> {
        self.write_status(channel, mode).await
    }

    pub async fn set_rmode_auto(&mut self) -> Result<()> {
        self.set_selected(RangingMode::Auto).await
    }

    pub async fn set_rmode_manual(&mut self) -> Result<()> {
        self.set_selected(RangingMode::Manual).await
    }

    /// Raw `SENS<ch>:POW:ATIM?` reply for the selected channel.
    pub async fn current_sensing_time(&mut self) -> Result<String> {
        self.query(&format!("SENS{}:POW:ATIM?", self.channel)).await
    }

    /// Averaging time of `channel`, in seconds.
    pub async fn sensing_time_on(&mut self, channel: Channel) -> Result<f64> {
        let reply = self.query(&format!("SENS{channel}:POW:ATIM?")).await?;
        parse_seconds(&reply)
    }

    pub async fn set_sensing_time_on(&mut self, channel: Channel, seconds: f64) -> Result<()> {
        self.write(&format!("SENS{channel}:POW:ATIM {seconds}")).await
    }

    pub async fn set_sensing_time(&mut self, seconds: f64) -> Result<()> {
        let result = self.set_sensing_time_on(self.channel, seconds).await;
        if result.is_ok() {
            self.output(&format!("Sensing Time Set To {seconds}"));
        }
        self.settle(result, "Could Not Change Sensing Time")
    }

    /// Raw `READ<ch>:POW?` reply for the selected channel. Parsing is left to
    /// the caller; see [`parse_power`].
    pub async fn measure_power(&mut self) -> Result<String> {
        self.query(&format!("READ{}:POW?", self.channel)).await
    }

    pub async fn read_power_on(&mut self, channel: Channel) -> Result<f64> {
        let reply = self.query(&format!("READ{channel}:POW?")).await?;
        parse_power(&reply)
    }

    /// Read channels 1 to 4 in order. Each read selects its channel first, so
    /// channel 4 is left selected.
    pub async fn measure_all(&mut self) -> Result<[f64; 4]> {
        let mut readings = [0.0; 4];
        for (slot, channel) in readings.iter_mut().zip(Channel::ALL) {
            self.set_channel(channel);
            *slot = parse_power(&self.measure_power().await?)?;
        }
        Ok(readings)
    }

    async fn query_status<T: StatusCode>(&mut self, channel: Channel) -> Result<T> {
        let command = format!("SENS{channel}:{}?", T::PATH);
        let reply = self.query(&command).await?;
        match parse_status::<T>(&reply) {
            Some(status) => {
                self.output(status.current_label());
                Ok(status)
            }
            None => {
                self.output(T::UNRECOGNIZED);
                Err(Error::UnexpectedReply { command, reply })
            }
        }
    }

    async fn write_status<T: StatusCode>(&mut self, channel: Channel, status: T) -> Result<()> {
        self.write(&format!("SENS{channel}:{} {}", T::PATH, status.code()))
            .await
    }

    async fn set_selected<T: StatusCode>(&mut self, status: T) -> Result<()> {
        let result = self.write_status(self.channel, status).await;
        if result.is_ok() {
            self.output(status.set_label());
        }
        self.settle(result, status.set_failure())
    }

    fn session(&mut self) -> Result<&mut S> {
        self.session.as_mut().ok_or(Error::NotConnected)
    }

    async fn write(&mut self, command: &str) -> Result<()> {
        self.session()?.write(command).await
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.session()?.query(command).await
    }

    fn output(&self, message: &str) {
        if self.options.show_output {
            info!("{message}");
        } else {
            debug!("{message}");
        }
    }

    fn announce(&self, message: &str) {
        if self.options.verbose {
            info!("{message}");
        } else {
            debug!("{message}");
        }
    }

    fn settle(&self, result: Result<()>, failure: &str) -> Result<()> {
        match (result, self.options.error_policy) {
            (Err(e), ErrorPolicy::LogAndContinue) => {
                warn!("{failure}: {e}");
                Ok(())
            }
            (result, _) => result,
        }
    }

    fn tolerate(self, err: Error) -> Result<Self> {
        match self.options.error_policy {
            ErrorPolicy::Propagate => Err(err),
            ErrorPolicy::LogAndContinue => Ok(self),
        }
    }
}

/// Parse a `0`/`1` status reply. Only a single integer token is accepted,
/// optionally with a leading `+`.
pub fn parse_status<T: StatusCode>(reply: &str) -> Option<T> {
    let token = reply.trim();
    let token = token.strip_prefix('+').unwrap_or(token);
    token.parse::<u8>().ok().and_then(T::from_code)
}

pub fn parse_power(reply: &str) -> Result<f64> {
    parse_float("power", reply)
}

/// Parse a sensing time reply, in seconds.
pub fn parse_seconds(reply: &str) -> Result<f64> {
    parse_float("sensing time", reply)
}

fn parse_float(quantity: &'static str, reply: &str) -> Result<f64> {
    reply
        .trim()
        .parse::<f64>()
        .map_err(|source| Error::ParseFloat {
            quantity,
            reply: reply.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFactory, MockSession};
    use tracing_test::traced_test;

    const ADDRESS: &str = "TCPIP0::192.168.0.10::inst0::INSTR";
    const IDN: &str = "Keysight Technologies,N7744A,MY48101084,V1.06";

    async fn meter(session: &MockSession, options: Options) -> N7744a<MockSession> {
        session.push_reply(IDN);
        let meter = N7744a::open(&MockFactory::new(session.clone()), ADDRESS, options)
            .await
            .unwrap();
        session.clear_sent();
        meter
    }

    fn lenient() -> Options {
        Options::default().error_policy(ErrorPolicy::LogAndContinue)
    }

    #[tokio::test]
    async fn open_captures_identity() {
        let session = MockSession::new();
        session.push_reply(format!("{IDN}\n"));
        let meter = N7744a::open(&MockFactory::new(session.clone()), ADDRESS, Options::default())
            .await
            .unwrap();

        assert!(meter.is_connected());
        assert_eq!(meter.device_info(), Some(IDN));
        assert_eq!(meter.address(), ADDRESS);
        assert_eq!(meter.channel(), Channel::Ch1);
        assert_eq!(session.sent(), vec!["*IDN?"]);
    }

    #[tokio::test]
    async fn open_unreachable_address_fails() {
        let result = N7744a::open(&MockFactory::unreachable(), ADDRESS, Options::default()).await;
        assert!(matches!(result, Err(Error::Connect { .. })));
    }

    #[tokio::test]
    async fn lenient_open_unreachable_yields_disconnected_meter() {
        let mut meter = N7744a::open(&MockFactory::unreachable(), ADDRESS, lenient())
            .await
            .unwrap();

        assert!(!meter.is_connected());
        assert_eq!(meter.device_info(), None);
        assert!(matches!(meter.measure_power().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn open_wrong_device_fails_identify_and_closes() {
        let session = MockSession::new();
        session.fail_on("*IDN?");
        let result =
            N7744a::open(&MockFactory::new(session.clone()), ADDRESS, Options::default()).await;

        assert!(matches!(result, Err(Error::Identify { .. })));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn lenient_open_wrong_device_yields_disconnected_meter() {
        let session = MockSession::new();
        let meter = N7744a::open(&MockFactory::new(session.clone()), ADDRESS, lenient())
            .await
            .unwrap();

        // No reply queued, so `*IDN?` comes back empty.
        assert!(!meter.is_connected());
        assert_eq!(meter.device_info(), None);
    }

    #[tokio::test]
    async fn initial_channel_is_used() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default().initial_channel(Channel::Ch3)).await;
        session.push_reply("+1.0E-06");

        meter.measure_power().await.unwrap();
        assert_eq!(session.sent(), vec!["READ3:POW?"]);
    }

    #[tokio::test]
    async fn release_disconnects() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;

        meter.release().await.unwrap();
        assert!(!meter.is_connected());
        assert!(session.is_closed());

        meter.release().await.unwrap();
        assert!(matches!(meter.set_units_dbm().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn units_are_classified_by_status_code() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        meter.set_channel(Channel::Ch2);

        session.push_reply("0").push_reply("+1\n");
        assert_eq!(meter.current_units().await.unwrap(), PowerUnit::Dbm);
        assert_eq!(meter.current_units().await.unwrap(), PowerUnit::Watt);
        assert_eq!(session.sent(), vec!["SENS2:POW:UNIT?", "SENS2:POW:UNIT?"]);

        for reply in ["2", "10", "W", "0,1"] {
            session.push_reply(reply);
            match meter.current_units().await {
                Err(Error::UnexpectedReply { command, reply: got }) => {
                    assert_eq!(command, "SENS2:POW:UNIT?");
                    assert_eq!(got, reply);
                }
                other => panic!("{reply:?} gave {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn modes_are_classified_by_status_code() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;

        session.push_reply("0").push_reply("1").push_reply("x");
        assert_eq!(
            meter.current_measurement_mode().await.unwrap(),
            MeasurementMode::Absolute
        );
        assert_eq!(
            meter.current_measurement_mode().await.unwrap(),
            MeasurementMode::Relative
        );
        assert!(matches!(
            meter.current_measurement_mode().await,
            Err(Error::UnexpectedReply { .. })
        ));

        session.push_reply("+0").push_reply("1").push_reply("01x");
        assert_eq!(meter.current_ranging_mode().await.unwrap(), RangingMode::Manual);
        assert_eq!(meter.current_ranging_mode().await.unwrap(), RangingMode::Auto);
        assert!(matches!(
            meter.current_ranging_mode().await,
            Err(Error::UnexpectedReply { .. })
        ));

        let sent = session.sent();
        assert_eq!(&sent[..3], ["SENS1:POW:REF:STAT?"; 3]);
        assert_eq!(&sent[3..], ["SENS1:POW:RANG:AUTO?"; 3]);
    }

    #[tokio::test]
    async fn unit_setters_address_every_channel() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        meter.set_channel(Channel::Ch3);

        meter.set_units_dbm().await.unwrap();
        assert_eq!(
            session.sent(),
            vec![
                "SENS1:POW:UNIT 0",
                "SENS2:POW:UNIT 0",
                "SENS3:POW:UNIT 0",
                "SENS4:POW:UNIT 0",
            ]
        );

        session.clear_sent();
        meter.set_units_watts().await.unwrap();
        assert_eq!(
            session.sent(),
            vec![
                "SENS1:POW:UNIT 1",
                "SENS2:POW:UNIT 1",
                "SENS3:POW:UNIT 1",
                "SENS4:POW:UNIT 1",
            ]
        );
        assert_eq!(meter.channel(), Channel::Ch3);
    }

    #[tokio::test]
    async fn unit_setter_stops_at_first_failure() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        session.fail_on("SENS2:POW:UNIT");

        let err = meter.set_units_watts().await.unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
        assert_eq!(session.sent(), vec!["SENS1:POW:UNIT 1", "SENS2:POW:UNIT 1"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn lenient_setters_log_and_continue() {
        let session = MockSession::new();
        let mut meter = meter(&session, lenient()).await;
        session.fail_on("SENS");

        meter.set_units_watts().await.unwrap();
        meter.set_mmode_rel().await.unwrap();
        meter.set_sensing_time(0.5).await.unwrap();

        assert_eq!(
            session.sent(),
            vec!["SENS1:POW:UNIT 1", "SENS1:POW:REF:STAT 1", "SENS1:POW:ATIM 0.5"]
        );
        assert!(logs_contain("Could Not Set Units To Watts"));
        assert!(logs_contain("Could Not Set Measurement Mode to Relative"));
        assert!(logs_contain("Could Not Change Sensing Time"));
    }

    #[tokio::test]
    async fn sensing_time_on_reports_bad_reply_as_sensing_time() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        session.push_reply("n/a");

        let err = meter.sensing_time_on(Channel::Ch1).await.unwrap_err();
        assert!(matches!(err, Error::ParseFloat { quantity: "sensing time", .. }));
    }

    #[tokio::test]
    #[traced_test]
    async fn current_units_logs_status_labels() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        session.push_reply("0").push_reply("1").push_reply("x");

        meter.current_units().await.unwrap();
        meter.current_units().await.unwrap();
        assert!(meter.current_units().await.is_err());

        logs_assert(|lines: &[&str]| {
            for label in [
                "Current Units: dBm",
                "Current Units: Watts",
                "Units Set to Default (Watts)",
            ] {
                if !lines.iter().any(|l| l.contains("INFO") && l.contains(label)) {
                    return Err(format!("{label:?} not logged at INFO"));
                }
            }
            Ok(())
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn mode_queries_log_status_labels() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        session.push_reply("1").push_reply("?").push_reply("0");

        meter.current_measurement_mode().await.unwrap();
        assert!(meter.current_measurement_mode().await.is_err());
        meter.current_ranging_mode().await.unwrap();

        assert!(logs_contain("Current Measurement Mode: Relative"));
        assert!(logs_contain("Current Measurement Mode Could Not Be Found"));
        assert!(logs_contain("Current Ranging Mode: Manual"));
    }

    #[tokio::test]
    #[traced_test]
    async fn hidden_output_logs_labels_at_debug() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default().show_output(false)).await;
        session.push_reply("0").push_reply("x");

        meter.current_units().await.unwrap();
        assert!(meter.current_units().await.is_err());

        logs_assert(|lines: &[&str]| {
            for label in ["Current Units: dBm", "Units Set to Default (Watts)"] {
                let at = |level: &str| {
                    lines
                        .iter()
                        .any(|l| l.contains(level) && l.contains(label))
                };
                if !at("DEBUG") || at("INFO") {
                    return Err(format!("{label:?} should be logged at DEBUG only"));
                }
            }
            Ok(())
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn verbose_open_logs_connection_at_info() {
        let session = MockSession::new();
        let _meter = meter(&session, Options::default().verbose(true)).await;

        logs_assert(|lines: &[&str]| {
            let info = |msg: &str| lines.iter().any(|l| l.contains("INFO") && l.contains(msg));
            if info("RESOURCE CONNECTED") && info(&format!("CONNECTED TO: {IDN}")) {
                Ok(())
            } else {
                Err("connection messages not logged at INFO".to_string())
            }
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn quiet_open_logs_connection_at_debug() {
        let session = MockSession::new();
        let _meter = meter(&session, Options::default()).await;

        logs_assert(|lines: &[&str]| {
            let at = |level: &str| {
                lines
                    .iter()
                    .any(|l| l.contains(level) && l.contains("CONNECTED TO: "))
            };
            if at("DEBUG") && !at("INFO") {
                Ok(())
            } else {
                Err("identity message should be logged at DEBUG only".to_string())
            }
        });
    }

    #[tokio::test]
    async fn lenient_queries_still_fail() {
        let session = MockSession::new();
        let mut meter = meter(&session, lenient()).await;
        session.push_reply("nonsense");

        assert!(meter.current_units().await.is_err());
    }

    #[tokio::test]
    async fn mode_setters_address_selected_channel_only() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        meter.set_channel(Channel::Ch2);

        meter.set_mmode_abs().await.unwrap();
        meter.set_mmode_rel().await.unwrap();
        meter.set_rmode_auto().await.unwrap();
        meter.set_rmode_manual().await.unwrap();

        assert_eq!(
            session.sent(),
            vec![
                "SENS2:POW:REF:STAT 0",
                "SENS2:POW:REF:STAT 1",
                "SENS2:POW:RANG:AUTO 1",
                "SENS2:POW:RANG:AUTO 0",
            ]
        );
    }

    #[tokio::test]
    async fn explicit_channel_methods_leave_selection_alone() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        session.push_reply("1").push_reply("-12.5");

        meter.set_ranging_mode_on(Channel::Ch4, RangingMode::Auto).await.unwrap();
        meter
            .set_measurement_mode_on(Channel::Ch3, MeasurementMode::Relative)
            .await
            .unwrap();
        assert_eq!(meter.units_on(Channel::Ch2).await.unwrap(), PowerUnit::Watt);
        assert_eq!(meter.read_power_on(Channel::Ch4).await.unwrap(), -12.5);

        assert_eq!(
            session.sent(),
            vec![
                "SENS4:POW:RANG:AUTO 1",
                "SENS3:POW:REF:STAT 1",
                "SENS2:POW:UNIT?",
                "READ4:POW?",
            ]
        );
        assert_eq!(meter.channel(), Channel::Ch1);
    }

    #[tokio::test]
    async fn sensing_time_round_trip() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        meter.set_channel(Channel::Ch4);
        session
            .push_reply("+1.00000000E-001")
            .push_reply("+1.00000000E-001");

        meter.set_sensing_time(0.1).await.unwrap();
        assert_eq!(meter.current_sensing_time().await.unwrap(), "+1.00000000E-001");
        assert_eq!(meter.sensing_time_on(Channel::Ch4).await.unwrap(), 0.1);
        assert_eq!(
            session.sent(),
            vec!["SENS4:POW:ATIM 0.1", "SENS4:POW:ATIM?", "SENS4:POW:ATIM?"]
        );
    }

    #[tokio::test]
    async fn measure_power_returns_raw_reply() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        meter.set_channel(Channel::Ch2);
        session.push_reply("+1.25E-03");

        assert_eq!(meter.measure_power().await.unwrap(), "+1.25E-03");
        assert_eq!(session.sent(), vec!["READ2:POW?"]);
    }

    #[tokio::test]
    async fn measure_all_reads_channels_in_order() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        meter.set_channel(Channel::Ch2);
        for reply in ["1.5E-06", "-3.25", "+7", "0"] {
            session.push_reply(reply);
        }

        let readings = meter.measure_all().await.unwrap();
        assert_eq!(readings, [1.5e-6, -3.25, 7.0, 0.0]);
        assert_eq!(
            session.sent(),
            vec!["READ1:POW?", "READ2:POW?", "READ3:POW?", "READ4:POW?"]
        );
        assert_eq!(meter.channel(), Channel::Ch4);
    }

    #[tokio::test]
    async fn measure_all_rejects_non_numeric_reply() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        session.push_reply("1.0").push_reply("overload");

        let err = meter.measure_all().await.unwrap_err();
        assert!(matches!(err, Error::ParseFloat { .. }));
        assert_eq!(meter.channel(), Channel::Ch2);
    }

    #[tokio::test]
    async fn identify_refreshes_device_info() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        session.push_reply("Keysight Technologies,N7744A,MY48101084,V1.07");

        assert!(meter.identify().await.unwrap().ends_with("V1.07"));
        assert_eq!(
            meter.device_info(),
            Some("Keysight Technologies,N7744A,MY48101084,V1.07")
        );
    }

    #[test]
    fn channel_conversions() {
        assert_eq!(Channel::try_from(3).unwrap(), Channel::Ch3);
        assert!(matches!(Channel::try_from(0), Err(Error::InvalidChannel(_))));
        assert!(matches!(Channel::try_from(5), Err(Error::InvalidChannel(_))));
        assert_eq!("CH4".parse::<Channel>().unwrap(), Channel::Ch4);
        assert_eq!(" 2 ".parse::<Channel>().unwrap(), Channel::Ch2);
        assert!("ch9".parse::<Channel>().is_err());
        assert_eq!(Channel::Ch2.to_string(), "2");
    }

    #[tokio::test]
    async fn set_channel_then_channel() {
        let session = MockSession::new();
        let mut meter = meter(&session, Options::default()).await;
        for channel in Channel::ALL {
            meter.set_channel(channel);
            assert_eq!(meter.channel(), channel);
            assert_eq!(meter.channel().to_string(), channel.number().to_string());
        }
        assert!(session.sent().is_empty());
    }

    #[test]
    fn status_parsing_is_strict() {
        assert_eq!(parse_status::<PowerUnit>("0"), Some(PowerUnit::Dbm));
        assert_eq!(parse_status::<PowerUnit>(" +1 "), Some(PowerUnit::Watt));
        assert_eq!(parse_status::<PowerUnit>("2"), None);
        assert_eq!(parse_status::<PowerUnit>("10"), None);
        assert_eq!(parse_status::<PowerUnit>("dBm 0"), None);
        assert_eq!(parse_status::<PowerUnit>(""), None);
    }

    #[test]
    fn power_parsing() {
        assert_eq!(parse_power("+1.234E-06\n").unwrap(), 1.234e-6);
        assert_eq!(parse_power("-20.5").unwrap(), -20.5);
        assert!(matches!(
            parse_power("ERR"),
            Err(Error::ParseFloat { quantity: "power", .. })
        ));
    }

    #[test]
    fn seconds_parsing() {
        assert_eq!(parse_seconds("+1.00000000E-001").unwrap(), 0.1);
        let err = parse_seconds("slow").unwrap_err();
        assert!(matches!(err, Error::ParseFloat { quantity: "sensing time", .. }));
        assert_eq!(err.to_string(), "failed to parse sensing time from \"slow\"");
    }
}
