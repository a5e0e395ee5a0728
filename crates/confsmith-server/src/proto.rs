//! NETCONF-shaped request parsing and reply building.
//!
//! Requests arrive as `<rpc>` documents and replies leave as
//! `<rpc-reply>` documents. Both directions work on structured trees
//! serialized once; no fragment concatenation.

use confsmith_core::edit::EditOp;
use confsmith_core::path::NodePath;
use confsmith_core::rpc_error::{ErrorTag, RpcError};
use confsmith_core::tree::{ConfigTree, NodeId};
use confsmith_core::xml;

/// One parsed NETCONF operation.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Request {
    GetConfig {
        source: String,
        filter: Option<NodePath>,
    },
    Get {
        filter: Option<NodePath>,
    },
    EditConfig {
        target: String,
        default_op: EditOp,
        config: ConfigTree,
    },
    CopyConfig {
        source: String,
        target: String,
    },
    DeleteConfig {
        target: String,
    },
    Lock {
        target: String,
    },
    Unlock {
        target: String,
    },
    Validate {
        source: String,
    },
    Commit,
    DiscardChanges,
    CreateSubscription {
        stream: String,
        filter: Option<NodePath>,
    },
    CloseSession,
    KillSession {
        session_id: u32,
    },
}

/// A request with its envelope attributes.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub message_id: Option<String>,
    pub request: Request,
}

/// Parses an `<rpc>` document into a request. Malformed input produces a
/// `malformed-message` error without the datastore being touched.
pub fn parse_rpc(input: &str) -> Result<RpcRequest, RpcError> {
    let doc = xml::parse_document(input).map_err(|e| RpcError::malformed(e.to_string()))?;
    let root = doc.root();
    if doc.name(root) != "rpc" {
        return Err(RpcError::malformed(format!(
            "expected <rpc> element, found <{}>",
            doc.name(root)
        )));
    }
    let message_id = doc.attr(root, "message-id").map(str::to_string);
    let mut ops = doc.children(root).iter().copied();
    let op = ops.next().ok_or_else(|| {
        RpcError::malformed("rpc element carries no operation".to_string())
    })?;
    if ops.next().is_some() {
        return Err(RpcError::malformed(
            "rpc element carries more than one operation".to_string(),
        ));
    }

    let request = match doc.name(op) {
        "get-config" => Request::GetConfig {
            source: db_argument(&doc, op, "source")?,
            filter: filter_argument(&doc, op)?,
        },
        "get" => Request::Get {
            filter: filter_argument(&doc, op)?,
        },
        "edit-config" => {
            let target = db_argument(&doc, op, "target")?;
            let default_op = match doc
                .first_child(op, "default-operation")
                .and_then(|n| doc.value(n))
            {
                Some(raw) => raw.parse::<EditOp>()?,
                None => EditOp::Merge,
            };
            let config_node = doc.first_child(op, "config").ok_or_else(|| {
                RpcError::malformed("edit-config carries no <config> element".to_string())
            })?;
            let mut config = ConfigTree::new();
            for child in doc.children(config_node).iter().copied() {
                config.graft(config.root(), &doc, child);
            }
            Request::EditConfig {
                target,
                default_op,
                config,
            }
        }
        "copy-config" => Request::CopyConfig {
            source: db_argument(&doc, op, "source")?,
            target: db_argument(&doc, op, "target")?,
        },
        "delete-config" => Request::DeleteConfig {
            target: db_argument(&doc, op, "target")?,
        },
        "lock" => Request::Lock {
            target: db_argument(&doc, op, "target")?,
        },
        "unlock" => Request::Unlock {
            target: db_argument(&doc, op, "target")?,
        },
        "validate" => Request::Validate {
            source: db_argument(&doc, op, "source")?,
        },
        "commit" => Request::Commit,
        "discard-changes" => Request::DiscardChanges,
        "create-subscription" => {
            let stream = doc
                .first_child(op, "stream")
                .and_then(|n| doc.value(n))
                .unwrap_or("NETCONF")
                .to_string();
            Request::CreateSubscription {
                stream,
                filter: filter_argument(&doc, op)?,
            }
        }
        "close-session" => Request::CloseSession,
        "kill-session" => {
            let raw = doc
                .first_child(op, "session-id")
                .and_then(|n| doc.value(n))
                .ok_or_else(|| {
                    RpcError::malformed("kill-session carries no <session-id>".to_string())
                })?;
            let session_id = raw.parse::<u32>().map_err(|_| {
                RpcError::application(
                    ErrorTag::InvalidValue,
                    format!("'{raw}' is not a session id"),
                )
            })?;
            Request::KillSession { session_id }
        }
        other => {
            return Err(RpcError::application(
                ErrorTag::OperationNotSupported,
                format!("unknown operation '{other}'"),
            ));
        }
    };
    Ok(RpcRequest {
        message_id,
        request,
    })
}

/// `<source><candidate/></source>` style database arguments.
fn db_argument(doc: &ConfigTree, op: NodeId, element: &str) -> Result<String, RpcError> {
    let holder = doc.first_child(op, element).ok_or_else(|| {
        RpcError::malformed(format!(
            "{} carries no <{element}> element",
            doc.name(op)
        ))
    })?;
    let db = doc.children(holder).first().copied().ok_or_else(|| {
        RpcError::malformed(format!("<{element}> names no database"))
    })?;
    Ok(doc.name(db).to_string())
}

/// `<filter type="xpath" select="/a/b"/>`; subtree filters are not
/// supported by this dispatcher.
fn filter_argument(doc: &ConfigTree, op: NodeId) -> Result<Option<NodePath>, RpcError> {
    let Some(filter) = doc.first_child(op, "filter") else {
        return Ok(None);
    };
    let Some(select) = doc.attr(filter, "select") else {
        return Err(RpcError::application(
            ErrorTag::OperationNotSupported,
            "only select-based filters are supported".to_string(),
        ));
    };
    let path = NodePath::parse(select).map_err(|e| {
        RpcError::application(ErrorTag::InvalidValue, format!("bad filter: {e}"))
            .with_app_tag("bad-select")
    })?;
    Ok(Some(path))
}

/// What goes back to the client.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok,
    Data(ConfigTree),
    Errors(Vec<RpcError>),
}

impl Reply {
    pub fn error(e: RpcError) -> Self {
        Self::Errors(vec![e])
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Errors(_))
    }

    /// Builds the `<rpc-reply>` document.
    pub fn to_xml(&self, message_id: Option<&str>, pretty: bool) -> String {
        let mut reply = ConfigTree::with_root("rpc-reply");
        let root = reply.root();
        if let Some(id) = message_id {
            reply.set_attr(root, "message-id", id);
        }
        match self {
            Self::Ok => {
                reply.append_child(root, "ok");
                xml::to_xml(&reply, pretty)
            }
            Self::Data(tree) => {
                let data = reply.append_child(root, "data");
                for child in tree.children(tree.root()).to_vec() {
                    reply.graft(data, tree, child);
                }
                xml::to_xml(&reply, pretty)
            }
            Self::Errors(errors) => {
                // rpc-error documents carry their own rendering.
                let mut out = String::from("<rpc-reply");
                if let Some(id) = message_id {
                    out.push_str(&format!(" message-id=\"{id}\""));
                }
                out.push('>');
                for e in errors {
                    out.push_str(&e.to_xml());
                }
                out.push_str("</rpc-reply>");
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_get_config() {
        let req = parse_rpc(
            r#"<rpc message-id="1"><get-config><source><running/></source></get-config></rpc>"#,
        )
        .unwrap();
        assert_eq!(req.message_id.as_deref(), Some("1"));
        match req.request {
            Request::GetConfig { source, filter } => {
                assert_eq!(source, "running");
                assert!(filter.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_get_config_with_filter() {
        let req = parse_rpc(
            r#"<rpc message-id="2"><get-config><source><running/></source>
               <filter type="xpath" select="/a/x"/></get-config></rpc>"#,
        )
        .unwrap();
        match req.request {
            Request::GetConfig { filter, .. } => {
                assert_eq!(filter.unwrap().to_string(), "/a/x");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_edit_config() {
        let req = parse_rpc(
            r#"<rpc message-id="3"><edit-config><target><candidate/></target>
               <default-operation>none</default-operation>
               <config><a operation="create"><x>1</x></a></config></edit-config></rpc>"#,
        )
        .unwrap();
        match req.request {
            Request::EditConfig {
                target,
                default_op,
                config,
            } => {
                assert_eq!(target, "candidate");
                assert_eq!(default_op, EditOp::None);
                let a = config.first_child(config.root(), "a").unwrap();
                assert_eq!(config.attr(a, "operation"), Some("create"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_lock_unlock_commit() {
        let req =
            parse_rpc(r#"<rpc><lock><target><candidate/></target></lock></rpc>"#).unwrap();
        assert!(matches!(req.request, Request::Lock { target } if target == "candidate"));

        let req =
            parse_rpc(r#"<rpc><unlock><target><candidate/></target></unlock></rpc>"#).unwrap();
        assert!(matches!(req.request, Request::Unlock { .. }));

        let req = parse_rpc(r#"<rpc message-id="9"><commit/></rpc>"#).unwrap();
        assert!(matches!(req.request, Request::Commit));

        let req = parse_rpc(r#"<rpc><discard-changes/></rpc>"#).unwrap();
        assert!(matches!(req.request, Request::DiscardChanges));
    }

    #[test]
    fn parse_copy_and_delete() {
        let req = parse_rpc(
            r#"<rpc><copy-config><source><running/></source><target><startup/></target></copy-config></rpc>"#,
        )
        .unwrap();
        match req.request {
            Request::CopyConfig { source, target } => {
                assert_eq!(source, "running");
                assert_eq!(target, "startup");
            }
            other => panic!("unexpected {other:?}"),
        }

        let req =
            parse_rpc(r#"<rpc><delete-config><target><startup/></target></delete-config></rpc>"#)
                .unwrap();
        assert!(matches!(req.request, Request::DeleteConfig { target } if target == "startup"));
    }

    #[test]
    fn parse_subscription_and_session_ops() {
        let req = parse_rpc(
            r#"<rpc><create-subscription><stream>NETCONF</stream></create-subscription></rpc>"#,
        )
        .unwrap();
        assert!(
            matches!(req.request, Request::CreateSubscription { stream, .. } if stream == "NETCONF")
        );

        // Stream defaults to NETCONF when omitted.
        let req = parse_rpc(r#"<rpc><create-subscription/></rpc>"#).unwrap();
        assert!(
            matches!(req.request, Request::CreateSubscription { stream, .. } if stream == "NETCONF")
        );

        let req = parse_rpc(r#"<rpc><close-session/></rpc>"#).unwrap();
        assert!(matches!(req.request, Request::CloseSession));

        let req =
            parse_rpc(r#"<rpc><kill-session><session-id>4</session-id></kill-session></rpc>"#)
                .unwrap();
        assert!(matches!(req.request, Request::KillSession { session_id: 4 }));
    }

    #[test]
    fn malformed_requests_rejected() {
        for bad in [
            "not xml",
            "<hello/>",
            "<rpc/>",
            "<rpc><commit/><commit/></rpc>",
            "<rpc><get-config/></rpc>",
            "<rpc><edit-config><target><candidate/></target></edit-config></rpc>",
            "<rpc><kill-session/></rpc>",
        ] {
            let err = parse_rpc(bad).unwrap_err();
            assert_eq!(err.tag, ErrorTag::MalformedMessage, "input: {bad}");
        }
    }

    #[test]
    fn unknown_operation_not_supported() {
        let err = parse_rpc("<rpc><reboot/></rpc>").unwrap_err();
        assert_eq!(err.tag, ErrorTag::OperationNotSupported);
    }

    #[test]
    fn bad_kill_session_id_is_invalid_value() {
        let err =
            parse_rpc(r#"<rpc><kill-session><session-id>soon</session-id></kill-session></rpc>"#)
                .unwrap_err();
        assert_eq!(err.tag, ErrorTag::InvalidValue);
    }

    #[test]
    fn reply_ok_rendering() {
        let out = Reply::Ok.to_xml(Some("7"), false);
        assert_eq!(out, r#"<rpc-reply message-id="7"><ok/></rpc-reply>"#);
    }

    #[test]
    fn reply_data_rendering() {
        let tree = xml::parse_config("<config><a><x>1</x></a></config>").unwrap();
        let out = Reply::Data(tree).to_xml(Some("8"), false);
        assert_eq!(
            out,
            r#"<rpc-reply message-id="8"><data><a><x>1</x></a></data></rpc-reply>"#
        );
    }

    #[test]
    fn reply_error_rendering() {
        let out = Reply::error(RpcError::lock_denied("candidate", 3)).to_xml(None, false);
        assert!(out.starts_with("<rpc-reply><rpc-error>"));
        assert!(out.contains("<error-tag>lock-denied</error-tag>"));
        assert!(out.contains("<session-id>3</session-id>"));
        assert!(out.ends_with("</rpc-reply>"));
    }

    #[test]
    fn reply_pretty_rendering_parses_back() {
        let tree = xml::parse_config("<config><a><x>1</x></a></config>").unwrap();
        let out = Reply::Data(tree).to_xml(Some("1"), true);
        assert!(out.contains('\n'));
        assert!(xml::parse_document(&out).is_ok());
    }
}
