//! Astron message-type codes, reserved channels and default ports.
//!
//! The numeric values are the cluster's published protocol table and must not
//! change.

/// 64-bit addressable endpoint on the message bus.
pub type Channel = u64;

/// Distributed object id.
pub type DoId = u32;

pub type Zone = u32;

pub type MessageType = u16;

/// Message director port for internal connections.
pub const MD_PORT: u16 = 7199;

/// Client agent port for client connections.
pub const CA_PORT: u16 = 6667;

/// Destination of control messages; they carry no sender.
pub const CONTROL_CHANNEL: Channel = 1;

pub const STATE_SERVER_DEFAULT: Channel = 400_000;
pub const DBSS_DEFAULT: Channel = 400_001;

macro_rules! message_types {
    ($($name:ident = $value:literal,)*) => {
        $(pub const $name: MessageType = $value;)*

        /// Symbolic name of a message type, for diagnostics.
        pub fn message_name(code: MessageType) -> Option<&'static str> {
            match code {
                $($value => Some(stringify!($name)),)*
                _ => None,
            }
        }
    };
}

message_types! {
    // Client <-> client agent
    CLIENT_HELLO = 1,
    CLIENT_HELLO_RESP = 2,
    CLIENT_DISCONNECT = 3,
    CLIENT_EJECT = 4,
    CLIENT_HEARTBEAT = 5,
    CLIENT_OBJECT_SET_FIELD = 120,
    CLIENT_OBJECT_SET_FIELDS = 121,
    CLIENT_OBJECT_LEAVING = 132,
    CLIENT_OBJECT_LOCATION = 140,
    CLIENT_ENTER_OBJECT_REQUIRED = 142,
    CLIENT_ENTER_OBJECT_REQUIRED_OTHER = 143,
    CLIENT_OBJECT_LEAVING_OWNER = 161,
    CLIENT_ENTER_OBJECT_REQUIRED_OWNER = 172,
    CLIENT_ENTER_OBJECT_REQUIRED_OTHER_OWNER = 173,
    CLIENT_ADD_INTEREST = 200,
    CLIENT_ADD_INTEREST_MULTIPLE = 201,
    CLIENT_REMOVE_INTEREST = 203,
    CLIENT_DONE_INTEREST_RESP = 204,

    // Client agent
    CLIENTAGENT_SET_STATE = 1000,
    CLIENTAGENT_SET_CLIENT_ID = 1001,
    CLIENTAGENT_SEND_DATAGRAM = 1002,
    CLIENTAGENT_EJECT = 1004,
    CLIENTAGENT_DROP = 1005,
    CLIENTAGENT_DECLARE_OBJECT = 1010,
    CLIENTAGENT_UNDECLARE_OBJECT = 1011,
    CLIENTAGENT_ADD_SESSION_OBJECT = 1012,
    CLIENTAGENT_REMOVE_SESSION_OBJECT = 1013,
    CLIENTAGENT_SET_FIELDS_SENDABLE = 1014,
    CLIENTAGENT_OPEN_CHANNEL = 1100,
    CLIENTAGENT_CLOSE_CHANNEL = 1101,
    CLIENTAGENT_ADD_POST_REMOVE = 1110,
    CLIENTAGENT_CLEAR_POST_REMOVES = 1111,
    CLIENTAGENT_ADD_INTEREST = 1200,
    CLIENTAGENT_ADD_INTEREST_MULTIPLE = 1201,
    CLIENTAGENT_REMOVE_INTEREST = 1203,
    CLIENTAGENT_DONE_INTEREST_RESP = 1204,

    // State server
    STATESERVER_CREATE_OBJECT_WITH_REQUIRED = 2000,
    STATESERVER_CREATE_OBJECT_WITH_REQUIRED_OTHER = 2001,
    STATESERVER_DELETE_AI_OBJECTS = 2009,
    STATESERVER_OBJECT_GET_FIELD = 2010,
    STATESERVER_OBJECT_GET_FIELD_RESP = 2011,
    STATESERVER_OBJECT_GET_FIELDS = 2012,
    STATESERVER_OBJECT_GET_FIELDS_RESP = 2013,
    STATESERVER_OBJECT_GET_ALL = 2014,
    STATESERVER_OBJECT_GET_ALL_RESP = 2015,
    STATESERVER_OBJECT_SET_FIELD = 2020,
    STATESERVER_OBJECT_SET_FIELDS = 2021,
    STATESERVER_OBJECT_DELETE_FIELD_RAM = 2030,
    STATESERVER_OBJECT_DELETE_FIELDS_RAM = 2031,
    STATESERVER_OBJECT_DELETE_RAM = 2032,
    STATESERVER_OBJECT_SET_LOCATION = 2040,
    STATESERVER_OBJECT_CHANGING_LOCATION = 2041,
    STATESERVER_OBJECT_ENTER_LOCATION_WITH_REQUIRED = 2042,
    STATESERVER_OBJECT_ENTER_LOCATION_WITH_REQUIRED_OTHER = 2043,
    STATESERVER_OBJECT_GET_LOCATION = 2044,
    STATESERVER_OBJECT_GET_LOCATION_RESP = 2045,
    STATESERVER_OBJECT_SET_AI = 2050,
    STATESERVER_OBJECT_CHANGING_AI = 2051,
    STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED = 2052,
    STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED_OTHER = 2053,
    STATESERVER_OBJECT_GET_AI = 2054,
    STATESERVER_OBJECT_GET_AI_RESP = 2055,
    STATESERVER_OBJECT_SET_OWNER = 2060,
    STATESERVER_OBJECT_CHANGING_OWNER = 2061,
    STATESERVER_OBJECT_ENTER_OWNER_WITH_REQUIRED = 2062,
    STATESERVER_OBJECT_ENTER_OWNER_WITH_REQUIRED_OTHER = 2063,
    STATESERVER_OBJECT_GET_OWNER = 2064,
    STATESERVER_OBJECT_GET_OWNER_RESP = 2065,
    STATESERVER_OBJECT_ENTER_INTEREST_WITH_REQUIRED = 2066,
    STATESERVER_OBJECT_ENTER_INTEREST_WITH_REQUIRED_OTHER = 2067,
    STATESERVER_OBJECT_GET_ZONE_OBJECTS = 2100,
    STATESERVER_OBJECT_GET_ZONES_OBJECTS = 2102,
    STATESERVER_OBJECT_GET_CHILDREN = 2104,
    STATESERVER_OBJECT_GET_ZONE_COUNT = 2110,
    STATESERVER_OBJECT_GET_ZONE_COUNT_RESP = 2111,
    STATESERVER_OBJECT_GET_ZONES_COUNT = 2112,
    STATESERVER_OBJECT_GET_ZONES_COUNT_RESP = 2113,
    STATESERVER_OBJECT_GET_CHILD_COUNT = 2114,
    STATESERVER_OBJECT_GET_CHILD_COUNT_RESP = 2115,
    STATESERVER_OBJECT_DELETE_ZONE = 2120,
    STATESERVER_OBJECT_DELETE_ZONES = 2122,
    STATESERVER_OBJECT_DELETE_CHILDREN = 2124,
    STATESERVER_GET_ACTIVE_ZONES = 2125,
    STATESERVER_GET_ACTIVE_ZONES_RESP = 2126,

    // Database state server
    DBSS_OBJECT_ACTIVATE_WITH_DEFAULTS = 2200,
    DBSS_OBJECT_ACTIVATE_WITH_DEFAULTS_OTHER = 2201,
    DBSS_OBJECT_GET_ACTIVATED = 2207,
    DBSS_OBJECT_GET_ACTIVATED_RESP = 2208,
    DBSS_OBJECT_DELETE_FIELD_RAM = 2230,
    DBSS_OBJECT_DELETE_FIELDS_RAM = 2231,
    DBSS_OBJECT_DELETE_DISK = 2232,

    // Database server
    DBSERVER_CREATE_OBJECT = 3000,
    DBSERVER_CREATE_OBJECT_RESP = 3001,
    DBSERVER_OBJECT_GET_FIELD = 3010,
    DBSERVER_OBJECT_GET_FIELD_RESP = 3011,
    DBSERVER_OBJECT_GET_FIELDS = 3012,
    DBSERVER_OBJECT_GET_FIELDS_RESP = 3013,
    DBSERVER_OBJECT_GET_ALL = 3014,
    DBSERVER_OBJECT_GET_ALL_RESP = 3015,
    DBSERVER_OBJECT_SET_FIELD = 3020,
    DBSERVER_OBJECT_SET_FIELDS = 3021,
    DBSERVER_OBJECT_SET_FIELD_IF_EQUALS = 3022,
    DBSERVER_OBJECT_SET_FIELD_IF_EQUALS_RESP = 3023,
    DBSERVER_OBJECT_SET_FIELDS_IF_EQUALS = 3024,
    DBSERVER_OBJECT_SET_FIELDS_IF_EQUALS_RESP = 3025,
    DBSERVER_OBJECT_SET_FIELD_IF_EMPTY = 3026,
    DBSERVER_OBJECT_SET_FIELD_IF_EMPTY_RESP = 3027,
    DBSERVER_OBJECT_DELETE_FIELD = 3030,
    DBSERVER_OBJECT_DELETE_FIELDS = 3031,
    DBSERVER_OBJECT_DELETE = 3032,

    // Message director control
    CONTROL_ADD_CHANNEL = 9000,
    CONTROL_REMOVE_CHANNEL = 9001,
    CONTROL_ADD_RANGE = 9002,
    CONTROL_REMOVE_RANGE = 9003,
    CONTROL_ADD_POST_REMOVE = 9010,
    CONTROL_CLEAR_POST_REMOVES = 9011,
    CONTROL_SET_CON_NAME = 9012,
    CONTROL_SET_CON_URL = 9013,
    CONTROL_LOG_MESSAGE = 9014,
}

/// Reason codes carried by `CLIENT_EJECT` and `CLIENTAGENT_EJECT`.
pub mod disconnect {
    pub const OVERSIZED_DATAGRAM: u16 = 106;
    pub const NO_HELLO: u16 = 107;
    pub const INVALID_MSGTYPE: u16 = 108;
    pub const TRUNCATED_DATAGRAM: u16 = 109;
    pub const ANONYMOUS_VIOLATION: u16 = 113;
    pub const FORBIDDEN_INTEREST: u16 = 115;
    pub const MISSING_OBJECT: u16 = 117;
    pub const FORBIDDEN_FIELD: u16 = 118;
    pub const FORBIDDEN_RELOCATE: u16 = 119;
    pub const BAD_VERSION: u16 = 124;
    pub const BAD_DCHASH: u16 = 125;
    pub const SESSION_OBJECT_DELETED: u16 = 153;
}

/// Client agent session states for `CLIENTAGENT_SET_STATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ClientState {
    New = 0,
    Anonymous = 1,
    Established = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_names() {
        assert_eq!(message_name(CLIENT_HELLO), Some("CLIENT_HELLO"));
        assert_eq!(message_name(2050), Some("STATESERVER_OBJECT_SET_AI"));
        assert_eq!(message_name(CONTROL_LOG_MESSAGE), Some("CONTROL_LOG_MESSAGE"));
        assert_eq!(message_name(4242), None);
    }

    #[test]
    fn test_internal_codes_stay_in_their_ranges() {
        assert!((1000..1300).contains(&CLIENTAGENT_DONE_INTEREST_RESP));
        assert!((2000..=2200).contains(&STATESERVER_GET_ACTIVE_ZONES_RESP));
        assert!((3000..3100).contains(&DBSERVER_OBJECT_DELETE));
        assert!((9000..10_000).contains(&CONTROL_ADD_CHANNEL));
    }
}
