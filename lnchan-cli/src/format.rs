use lnchan::balance::Side;
use lnchan::channel::{ChannelInfo, SideInfo};
use lnchan::util::MSAT_PER_SAT;

fn side_info(info: &ChannelInfo, side: Side) -> Option<&SideInfo> {
    match side {
        Side::Local => info.local.as_ref(),
        Side::Remote => info.remote.as_ref(),
    }
}

/// What `side` can spend in sat, followed by `(+n)` for the other side's
/// funds it cannot spend right now.  Each amount is truncated to sat before
/// taking the difference.  `-` when the channel is not open.
pub fn side_label(info: &ChannelInfo, side: Side) -> String {
    let (own, other) = match (side_info(info, side), side_info(info, side.other())) {
        (Some(own), Some(other)) => (own, other),
        _ => return "-".to_string(),
    };
    let (available, other_available) = match (own.available_msat, other.available_msat) {
        (Some(a), Some(b)) => (a / MSAT_PER_SAT, b / MSAT_PER_SAT),
        _ => return "-".to_string(),
    };
    let other_balance = other.balance_msat / MSAT_PER_SAT;
    let mut label = available.to_string();
    if other_balance != other_available {
        label += &format!(" (+{})", other_balance.saturating_sub(other_available));
    }
    label
}

/// Row columns: node id, LOCAL label, REMOTE label, state
pub fn format_fields(info: &ChannelInfo) -> [String; 4] {
    [
        info.node_id.to_string(),
        side_label(info, Side::Local),
        side_label(info, Side::Remote),
        info.state.clone(),
    ]
}

/// One line per channel, columns separated by two spaces, prefixed by the
/// channel id
pub fn format_row(info: &ChannelInfo) -> String {
    let [node, local, remote, state] = format_fields(info);
    format!("{}  {}  {:>12}  {:>12}  {}", info.channel_id, node, local, remote, state)
}

/// The summary line shown under the channel list
pub fn status_line(peers: usize, nodes: usize, channels: usize) -> String {
    format!("{} peers, {} nodes, {} channels", peers, nodes, channels)
}
