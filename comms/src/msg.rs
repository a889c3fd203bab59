use std::{borrow::Cow, io};

use crate::{
    Deserialize, Serialize,
    specs::{
        client::ClientSpec,
        round::{EvaluateIns, EvaluateRes, FitIns, FitRes, ParamsRes},
    },
};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR: Header = 0;
const CONTROL: Header = 1;
const PARAMS: Header = 2;

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug, PartialEq)]
pub enum Payload<'a> {
    /// A parameter vector flattened in the model's declared order.
    Params(&'a [f32]),
}

/// The command for the `Control` variant of the `Msg` enum.
///
/// `Fit`, `Evaluate`, `FitRes` and `Params` are always followed by a `Payload::Params` message.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Join(ClientSpec),
    GetParameters,
    Params(ParamsRes),
    Fit(FitIns),
    FitRes(FitRes),
    Evaluate(EvaluateIns),
    EvaluateRes(EvaluateRes),
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug, PartialEq)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// Returns a short name of the message's kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::Join(_)) => "control/join",
            Msg::Control(Command::GetParameters) => "control/get_parameters",
            Msg::Control(Command::Params(_)) => "control/params",
            Msg::Control(Command::Fit(_)) => "control/fit",
            Msg::Control(Command::FitRes(_)) => "control/fit_res",
            Msg::Control(Command::Evaluate(_)) => "control/evaluate",
            Msg::Control(Command::EvaluateRes(_)) => "control/evaluate_res",
            Msg::Control(Command::Disconnect) => "control/disconnect",
            Msg::Data(Payload::Params(_)) => "data/params",
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid message kind {kind}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR.to_be_bytes());
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL.to_be_bytes());

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, cmd).unwrap();
                None
            }
            Msg::Data(Payload::Params(nums)) => {
                buf.extend_from_slice(&PARAMS.to_be_bytes());
                Some(bytemuck::cast_slice(nums))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at_mut(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap());

        match kind {
            ERR => {
                let string = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            PARAMS => {
                let nums: &[f32] = bytemuck::try_cast_slice(rest).map_err(|err| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Malformed parameters payload: {err}"),
                    )
                })?;

                Ok(Self::Data(Payload::Params(nums)))
            }
            kind => Self::invalid_kind(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs::round::{RoundConfig, TensorSpec};

    fn roundtrip(msg: &Msg<'_>) -> Vec<u32> {
        let mut buf = Vec::new();
        let zero_copy = msg.serialize(&mut buf);
        buf.extend_from_slice(zero_copy.unwrap_or_default());

        let mut aligned = vec![0u32; buf.len().div_ceil(4)];
        bytemuck::cast_slice_mut::<u32, u8>(&mut aligned)[..buf.len()].copy_from_slice(&buf);
        aligned
    }

    #[test]
    fn control_roundtrip() {
        let cmd = Command::Fit(FitIns {
            config: RoundConfig::new(),
            layout: vec![TensorSpec {
                name: "mean.bias".into(),
                shape: vec![10],
            }],
        });
        let msg = Msg::Control(cmd.clone());

        let mut buf = Vec::new();
        assert!(msg.serialize(&mut buf).is_none());
        let len = buf.len();

        let mut aligned = roundtrip(&msg);
        let bytes = &mut bytemuck::cast_slice_mut::<u32, u8>(&mut aligned)[..len];
        assert_eq!(Msg::deserialize(bytes).unwrap(), Msg::Control(cmd));
    }

    #[test]
    fn params_are_sent_zero_copy() {
        let params = [1.0, -2.5, 3.25];
        let msg = Msg::Data(Payload::Params(&params));

        let mut buf = Vec::new();
        let data = msg.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(data.len(), params.len() * size_of::<f32>());

        let mut aligned = roundtrip(&msg);
        let bytes = bytemuck::cast_slice_mut::<u32, u8>(&mut aligned);
        let Msg::Data(Payload::Params(nums)) = Msg::deserialize(bytes).unwrap() else {
            panic!("expected a params payload");
        };
        assert_eq!(nums, params);
    }

    #[test]
    fn invalid_kind_is_rejected() {
        let mut buf = 9u32.to_be_bytes();
        assert!(Msg::deserialize(&mut buf).is_err());
    }

    #[test]
    fn truncated_params_are_rejected() {
        let buf = [0, 0, 0, 2, 1, 2, 3, 4, 5, 6];
        let mut aligned = [0u32; 3];
        let bytes = &mut bytemuck::cast_slice_mut::<u32, u8>(&mut aligned)[..buf.len()];
        bytes.copy_from_slice(&buf);
        assert!(Msg::deserialize(bytes).is_err());
    }
}
