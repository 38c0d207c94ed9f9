//! Numeric reply names.
//!
//! Only numerics listed here count as handled; any other non-error numeric is
//! forwarded to the monitor as an unhandled message.

/// `ERR_NOSUCHNICK`: the target nickname left before our message arrived.
pub const ERR_NOSUCHNICK: &str = "err_nosuchnick";

/// Symbolic name for a three-digit numeric.
pub fn command_name(code: u16) -> Option<&'static str> {
    let name = match code {
        1 => "rpl_welcome",
        2 => "rpl_yourhost",
        3 => "rpl_created",
        4 => "rpl_myinfo",
        5 => "rpl_isupport",
        221 => "rpl_umodeis",
        250 => "rpl_statsconn",
        251 => "rpl_luserclient",
        252 => "rpl_luserop",
        253 => "rpl_luserunknown",
        254 => "rpl_luserchannels",
        255 => "rpl_luserme",
        265 => "rpl_localusers",
        266 => "rpl_globalusers",
        301 => "rpl_away",
        324 => "rpl_channelmodeis",
        329 => "rpl_creationtime",
        331 => "rpl_notopic",
        332 => "rpl_topic",
        333 => "rpl_topicwhotime",
        353 => "rpl_namreply",
        366 => "rpl_endofnames",
        372 => "rpl_motd",
        375 => "rpl_motdstart",
        376 => "rpl_endofmotd",
        396 => "rpl_hosthidden",
        401 => ERR_NOSUCHNICK,
        402 => "err_nosuchserver",
        403 => "err_nosuchchannel",
        404 => "err_cannotsendtochan",
        405 => "err_toomanychannels",
        406 => "err_wasnosuchnick",
        411 => "err_norecipient",
        412 => "err_notexttosend",
        421 => "err_unknowncommand",
        422 => "err_nomotd",
        431 => "err_nonicknamegiven",
        432 => "err_erroneusnickname",
        433 => "err_nicknameinuse",
        436 => "err_nickcollision",
        441 => "err_usernotinchannel",
        442 => "err_notonchannel",
        451 => "err_notregistered",
        461 => "err_needmoreparams",
        462 => "err_alreadyregistred",
        464 => "err_passwdmismatch",
        465 => "err_yourebannedcreep",
        471 => "err_channelisfull",
        472 => "err_unknownmode",
        473 => "err_inviteonlychan",
        474 => "err_bannedfromchan",
        475 => "err_badchannelkey",
        477 => "err_needreggednick",
        482 => "err_chanoprivsneeded",
        _ => return None,
    };
    Some(name)
}

/// Error replies occupy 400–599.
pub fn is_error(code: u16) -> bool {
    (400..600).contains(&code)
}

/// Errors that are expected and not worth reporting.
pub fn is_benign(name: &str) -> bool {
    name == ERR_NOSUCHNICK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name() {
        assert_eq!(command_name(1), Some("rpl_welcome"));
        assert_eq!(command_name(401), Some("err_nosuchnick"));
        assert_eq!(command_name(999), None);
    }

    #[test]
    fn test_error_range() {
        assert!(is_error(401));
        assert!(is_error(599));
        assert!(!is_error(376));
        assert!(!is_error(600));
    }

    #[test]
    fn test_only_nosuchnick_is_benign() {
        assert!(is_benign("err_nosuchnick"));
        assert!(!is_benign("err_nosuchchannel"));
        assert!(!is_benign("err_cannotsendtochan"));
    }
}
