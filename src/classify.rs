//! Which frame belongs to which step of a connection.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::frame::FrameType::{Control, Management};
use crate::frame::{Frame, FrameType, KeyMessage, MacAddr, Subtype};

use self::Role::{AccessPoint, Client};

/// The two stations (and the network name) one extraction looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationIdentity {
    pub client: MacAddr,
    pub access_point: MacAddr,
    pub ssid: String,
}

impl StationIdentity {
    pub fn new(client: MacAddr, access_point: MacAddr, ssid: impl Into<String>) -> Self {
        StationIdentity {
            client,
            access_point,
            ssid: ssid.into(),
        }
    }

    /// Builds an identity from user-supplied strings.
    pub fn parse(client: &str, access_point: &str, ssid: &str) -> Result<Self> {
        if ssid.is_empty() {
            return Err(Error::Configuration("the SSID can't be empty".into()));
        }
        let identity = StationIdentity::new(client.parse()?, access_point.parse()?, ssid);
        if identity.client == identity.access_point {
            return Err(Error::Configuration(format!(
                "client and access point are both {}",
                identity.client
            )));
        }
        Ok(identity)
    }

    fn address(&self, role: Role) -> MacAddr {
        match role {
            Role::Client => self.client,
            Role::AccessPoint => self.access_point,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    AccessPoint,
}

/// Exact field values a frame has to carry. Unset fields are not compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Criteria<'a> {
    pub sender: MacAddr,
    pub receiver: Option<MacAddr>,
    pub frame_type: FrameType,
    pub subtype: Subtype,
    pub ssid: Option<&'a str>,
}

/// True iff every field named by `criteria` equals the frame's value.
/// A frame that lacks one of those fields never matches.
pub fn matches(frame: &Frame, criteria: &Criteria) -> bool {
    frame.sender == Some(criteria.sender)
        && criteria.receiver.map_or(true, |receiver| frame.receiver == Some(receiver))
        && frame.frame_type == Some(criteria.frame_type)
        && frame.subtype == Some(criteria.subtype)
        && criteria.ssid.map_or(true, |ssid| frame.info.as_deref() == Some(ssid))
}

/// Position of the 4-way handshake. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStep {
    #[default]
    NotStarted,
    AuthenticationNonce,
    SupplicantNonce,
    GroupTemporalKey,
    Acknowledgement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    ProbeRequest,
    ProbeResponse,
    AuthenticationRequest,
    AuthenticationResponse,
    AssociationRequest,
    AssociationResponse,
    AuthenticationNonce,
    SupplicantNonce,
    GroupTemporalKey,
    Acknowledgement,
}

/// (sender, receiver, type, subtype) every event is recognised by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub sender: Role,
    pub receiver: Role,
    pub frame_type: FrameType,
    pub subtype: Subtype,
}

const fn signature(sender: Role, receiver: Role, frame_type: FrameType, subtype: Subtype) -> Signature {
    Signature {
        sender,
        receiver,
        frame_type,
        subtype,
    }
}

const SIGNATURES: [Signature; 10] = [
    signature(Client, AccessPoint, Management, Subtype::PROBE_REQUEST),
    signature(AccessPoint, Client, Management, Subtype::PROBE_RESPONSE),
    signature(Client, AccessPoint, Management, Subtype::AUTHENTICATION),
    signature(AccessPoint, Client, Management, Subtype::AUTHENTICATION),
    signature(Client, AccessPoint, Management, Subtype::ASSOCIATION_REQUEST),
    signature(AccessPoint, Client, Management, Subtype::ASSOCIATION_RESPONSE),
    signature(AccessPoint, Client, Control, Subtype::AUTHENTICATION),
    signature(Client, AccessPoint, Control, Subtype::AUTHENTICATION),
    signature(AccessPoint, Client, Control, Subtype::AUTHENTICATION),
    signature(Client, AccessPoint, Control, Subtype::AUTHENTICATION),
];

impl Event {
    /// Every event, in the order a connection goes through them.
    pub const ALL: [Event; 10] = [
        Event::ProbeRequest,
        Event::ProbeResponse,
        Event::AuthenticationRequest,
        Event::AuthenticationResponse,
        Event::AssociationRequest,
        Event::AssociationResponse,
        Event::AuthenticationNonce,
        Event::SupplicantNonce,
        Event::GroupTemporalKey,
        Event::Acknowledgement,
    ];

    /// Position in [`Event::ALL`].
    pub fn position(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Event> {
        Event::ALL.get(self.position() + 1).copied()
    }

    pub fn signature(self) -> Signature {
        SIGNATURES[self.position()]
    }

    pub fn handshake_step(self) -> Option<HandshakeStep> {
        match self {
            Event::AuthenticationNonce => Some(HandshakeStep::AuthenticationNonce),
            Event::SupplicantNonce => Some(HandshakeStep::SupplicantNonce),
            Event::GroupTemporalKey => Some(HandshakeStep::GroupTemporalKey),
            Event::Acknowledgement => Some(HandshakeStep::Acknowledgement),
            _ => None,
        }
    }

    fn key_message(self) -> Option<KeyMessage> {
        match self {
            Event::AuthenticationNonce => Some(KeyMessage::One),
            Event::SupplicantNonce => Some(KeyMessage::Two),
            Event::GroupTemporalKey => Some(KeyMessage::Three),
            Event::Acknowledgement => Some(KeyMessage::Four),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Event::ProbeRequest => "probe_request",
            Event::ProbeResponse => "probe_response",
            Event::AuthenticationRequest => "authentication_request",
            Event::AuthenticationResponse => "authentication_response",
            Event::AssociationRequest => "association_request",
            Event::AssociationResponse => "association_response",
            Event::AuthenticationNonce => "authentication_nonce",
            Event::SupplicantNonce => "supplicant_nonce",
            Event::GroupTemporalKey => "group_temporal_key",
            Event::Acknowledgement => "acknowledgement",
        }
    }

    /// The exact-match criteria for this event between the given stations.
    pub fn criteria(self, identity: &StationIdentity) -> Criteria<'_> {
        let signature = self.signature();
        Criteria {
            sender: identity.address(signature.sender),
            receiver: Some(identity.address(signature.receiver)),
            frame_type: signature.frame_type,
            subtype: signature.subtype,
            ssid: None,
        }
    }

    /// Does `frame` look like this event?
    ///
    /// Probe requests match either addressed to the access point or
    /// broadcast with the network's SSID. Handshake steps match their
    /// signature or an EAPOL-Key frame tagged with the step's message
    /// number (see [`Event::matches_key_message`]).
    pub fn matches(self, frame: &Frame, identity: &StationIdentity) -> bool {
        let criteria = self.criteria(identity);
        if matches(frame, &criteria) {
            return true;
        }
        match self {
            Event::ProbeRequest => matches(
                frame,
                &Criteria {
                    receiver: None,
                    ssid: Some(identity.ssid.as_str()),
                    ..criteria
                },
            ),
            _ => self.matches_key_message(frame, identity),
        }
    }

    /// An unprotected data frame between the two stations carrying this
    /// handshake step's EAPOL-Key message. False for every other event.
    pub fn matches_key_message(self, frame: &Frame, identity: &StationIdentity) -> bool {
        let message = match self.key_message() {
            Some(message) => message,
            None => return false,
        };
        let signature = self.signature();
        frame.key_message == Some(message)
            && frame.frame_type == Some(FrameType::Data)
            && frame.sender == Some(identity.address(signature.sender))
            && frame.receiver == Some(identity.address(signature.receiver))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
