//! DNS message construction helpers.

use std::net::Ipv4Addr;

use hickory_proto::error::ProtoResult;
use hickory_proto::op::{Edns, Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};

/// TTL of sinkhole answers.
pub const SINKHOLE_TTL: u32 = 3600;

/// Smallest UDP payload every client must accept.
pub const MIN_UDP_PAYLOAD: usize = 512;

/// Start a response to `request`: same ID, opcode and RD/CD bits, first
/// question copied.
pub fn reply_to(request: &Message) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_checking_disabled(request.checking_disabled())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError);
    if let Some(query) = request.queries().first() {
        reply.add_query(query.clone());
    }
    reply
}

/// Create a blocked response mapping the queried name to 0.0.0.0.
///
/// Always an A record, whatever type was asked for.
pub fn sinkhole(request: &Message, query: &Query) -> Message {
    let mut reply = reply_to(request);
    reply.add_answer(Record::from_rdata(
        query.name().clone(),
        SINKHOLE_TTL,
        RData::A(A(Ipv4Addr::UNSPECIFIED)),
    ));
    reply
}

/// SERVFAIL carrying the request's ID and question.
pub fn server_failure(request: &Message) -> Message {
    let mut reply = reply_to(request);
    reply.set_response_code(ResponseCode::ServFail);
    reply
}

/// Largest UDP reply the client accepts, from its EDNS OPT record.
pub fn udp_payload_limit(request: &Message) -> usize {
    request
        .extensions()
        .as_ref()
        .map_or(MIN_UDP_PAYLOAD, |edns| usize::from(edns.max_payload()))
        .max(MIN_UDP_PAYLOAD)
}

/// Make the reply's OPT record follow the request it answers.
///
/// Cached answers carry whatever OPT the upstream sent for an earlier
/// client. A client that sent no OPT must not get one back.
pub fn align_edns(reply: &mut Message, request: &Message) {
    if request.extensions().is_none() {
        *reply.extensions_mut() = None;
    } else if reply.extensions().is_none() {
        reply.set_edns(Edns::new());
    }
}

/// Encode a reply in wire format, compressing names.
///
/// If the encoded message is larger than `limit` the records are dropped
/// and the TC bit is set so the client retries over TCP.
pub fn encode(message: &Message, limit: usize) -> ProtoResult<Vec<u8>> {
    let bytes = message.to_vec()?;
    if bytes.len() <= limit {
        return Ok(bytes);
    }

    let mut truncated = message.clone();
    truncated.take_answers();
    truncated.take_name_servers();
    truncated.take_additionals();
    truncated.set_truncated(true);
    truncated.to_vec()
}
