mod net_char;
mod throughput;

pub use self::{
    net_char::{Distribution, DistributionParseError, NetChar, NodeNetChar, compose_packet_loss},
    throughput::Throughput,
};
