// Core module - collaborator traits and the data they return
pub mod probe_trait;

pub use probe_trait::{
    EchoReply,
    EchoTransport,
    ExposedService,
    ForwardResolver,
    GeoInfo,
    GeoLocator,
    PortEntry,
    PortScanReport,
    PortScanner,
    ReverseResolver,
    ThreatIntel,
    ThreatReport,
};
