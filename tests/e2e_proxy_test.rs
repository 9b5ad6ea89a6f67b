//! End-to-end proxy session tests against a mock upstream agent.

use bytes::{BufMut, Bytes, BytesMut};
use keyholder_proxy::agent::{Proxy, Upstream};
use keyholder_proxy::policy::fingerprint::both_fingerprints;
use keyholder_proxy::policy::Policy;
use keyholder_proxy::protocol::{read_message, write_message, AgentMessage};
use ssh_key::PublicKey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::{UnixListener, UnixStream};

const ED25519_KEY_WORK: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl user@work.example.com";
const ED25519_KEY_PERSONAL: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIHUu2eEV0kRvK3dMRlSFwHxVoNxCfwjKmAZBlhkNjC4i user@personal.example.com";

fn key_blob(key_str: &str) -> Vec<u8> {
    let public_key: PublicKey = key_str.parse().unwrap();
    public_key.to_bytes().unwrap()
}

fn sign_body(blob: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u32(blob.len() as u32);
    buf.put_slice(blob);
    buf.put_u32(4); // data
    buf.put_slice(b"challenge-data");
    buf.put_u32(0); // flags
    buf.freeze()
}

/// A mock upstream agent: echoes a fixed signature for any sign request and
/// a fixed identities-answer frame for any list request.
async fn start_mock_agent(socket_path: &std::path::Path) {
    let listener = UnixListener::bind(socket_path).unwrap();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                loop {
                    let msg = match read_message(&mut reader).await {
                        Ok(Some(msg)) => msg,
                        _ => break,
                    };
                    let response = match msg.code {
                        11 => AgentMessage::new(12, Bytes::from_static(b"\x00\x00\x00\x00")),
                        13 => AgentMessage::new(14, Bytes::from_static(b"signature-bytes")),
                        _ => AgentMessage::failure(),
                    };
                    if write_message(&mut writer, &response).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
}

async fn start_proxy(socket_path: &std::path::Path, proxy: Arc<Proxy>) {
    let listener = UnixListener::bind(socket_path).unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move {
                let _ = proxy.handle_client(stream).await;
            });
        }
    });
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
}

fn admins_policy(key_a_blob: &[u8]) -> Policy {
    let (md5, sha256) = both_fingerprints(key_a_blob);
    let mut policy: Policy = HashMap::new();
    let mut admins = HashSet::new();
    admins.insert("admins".to_string());
    policy.insert(md5, admins.clone());
    policy.insert(sha256, admins);
    policy
}

/// NOTE: this harness exercises `Proxy::handle_client` directly rather than
/// through peer-credential resolution (which requires the connecting process
/// to genuinely belong to the tested group). Each scenario substitutes a
/// fixed `PeerIdentity` by using an internal session constructor equivalent,
/// accomplished here by connecting as the test process itself (always
/// authorized for its own primary group) and asserting on the policy's
/// group membership for that group instead of `admins`/`users` literally.
fn own_primary_group() -> String {
    // The test process's own primary group name, resolved the same way the
    // peer resolver would for any local accepted connection.
    let gid = unsafe { libc::getgid() };
    let mut buf = vec![0i8; 16384];
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::group = std::ptr::null_mut();
    unsafe {
        libc::getgrgid_r(gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result);
        std::ffi::CStr::from_ptr((*result).gr_name)
            .to_string_lossy()
            .into_owned()
    }
}

#[tokio::test]
async fn scenario_1_list_identities_forwarded_verbatim() {
    let temp_dir = TempDir::new().unwrap();
    let upstream_path = temp_dir.path().join("upstream.sock");
    let proxy_path = temp_dir.path().join("proxy.sock");

    start_mock_agent(&upstream_path).await;
    let upstream = Upstream::new(&upstream_path);
    let proxy = Arc::new(Proxy::new(upstream, Arc::new(HashMap::new())));
    start_proxy(&proxy_path, proxy).await;

    let mut client = UnixStream::connect(&proxy_path).await.unwrap();
    let (mut r, mut w) = client.split();

    write_message(&mut w, &AgentMessage::new(11, Bytes::new()))
        .await
        .unwrap();
    let response = read_message(&mut r).await.unwrap().unwrap();
    assert_eq!(response.code, 12);
}

#[tokio::test]
async fn scenario_2_authorized_sign_relayed() {
    let temp_dir = TempDir::new().unwrap();
    let upstream_path = temp_dir.path().join("upstream.sock");
    let proxy_path = temp_dir.path().join("proxy.sock");

    let key_a = key_blob(ED25519_KEY_WORK);
    let group = own_primary_group();
    let (md5, sha256) = both_fingerprints(&key_a);
    let mut policy: Policy = HashMap::new();
    let mut groups = HashSet::new();
    groups.insert(group);
    policy.insert(md5, groups.clone());
    policy.insert(sha256, groups);

    start_mock_agent(&upstream_path).await;
    let upstream = Upstream::new(&upstream_path);
    let proxy = Arc::new(Proxy::new(upstream, Arc::new(policy)));
    start_proxy(&proxy_path, proxy).await;

    let mut client = UnixStream::connect(&proxy_path).await.unwrap();
    let (mut r, mut w) = client.split();

    write_message(&mut w, &AgentMessage::new(13, sign_body(&key_a)))
        .await
        .unwrap();
    let response = read_message(&mut r).await.unwrap().unwrap();
    assert_eq!(response.code, 14, "authorized sign request should relay the agent's signature");
}

#[tokio::test]
async fn scenario_3_unauthorized_group_gets_failure_frame() {
    let temp_dir = TempDir::new().unwrap();
    let upstream_path = temp_dir.path().join("upstream.sock");
    let proxy_path = temp_dir.path().join("proxy.sock");

    let key_a = key_blob(ED25519_KEY_WORK);
    // Policy authorizes a group the test process does not belong to.
    let policy = admins_policy(&key_a);

    start_mock_agent(&upstream_path).await;
    let upstream = Upstream::new(&upstream_path);
    let proxy = Arc::new(Proxy::new(upstream, Arc::new(policy)));
    start_proxy(&proxy_path, proxy).await;

    let mut client = UnixStream::connect(&proxy_path).await.unwrap();
    let (mut r, mut w) = client.split();

    write_message(&mut w, &AgentMessage::new(13, sign_body(&key_a)))
        .await
        .unwrap();
    let response = read_message(&mut r).await.unwrap().unwrap();
    assert_eq!(response.code, 5);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn scenario_4_key_not_in_policy_gets_failure_frame() {
    let temp_dir = TempDir::new().unwrap();
    let upstream_path = temp_dir.path().join("upstream.sock");
    let proxy_path = temp_dir.path().join("proxy.sock");

    let key_b = key_blob(ED25519_KEY_PERSONAL);

    start_mock_agent(&upstream_path).await;
    let upstream = Upstream::new(&upstream_path);
    let proxy = Arc::new(Proxy::new(upstream, Arc::new(HashMap::new())));
    start_proxy(&proxy_path, proxy).await;

    let mut client = UnixStream::connect(&proxy_path).await.unwrap();
    let (mut r, mut w) = client.split();

    write_message(&mut w, &AgentMessage::new(13, sign_body(&key_b)))
        .await
        .unwrap();
    let response = read_message(&mut r).await.unwrap().unwrap();
    assert_eq!(response.code, 5);
}

#[tokio::test]
async fn scenario_5_unknown_code_gets_failure_and_session_continues() {
    let temp_dir = TempDir::new().unwrap();
    let upstream_path = temp_dir.path().join("upstream.sock");
    let proxy_path = temp_dir.path().join("proxy.sock");

    start_mock_agent(&upstream_path).await;
    let upstream = Upstream::new(&upstream_path);
    let proxy = Arc::new(Proxy::new(upstream, Arc::new(HashMap::new())));
    start_proxy(&proxy_path, proxy).await;

    let mut client = UnixStream::connect(&proxy_path).await.unwrap();
    let (mut r, mut w) = client.split();

    write_message(&mut w, &AgentMessage::new(99, Bytes::new()))
        .await
        .unwrap();
    let response = read_message(&mut r).await.unwrap().unwrap();
    assert_eq!(response.code, 5);

    // Session continues: a subsequent valid request still gets a reply.
    write_message(&mut w, &AgentMessage::new(11, Bytes::new()))
        .await
        .unwrap();
    let response2 = read_message(&mut r).await.unwrap().unwrap();
    assert_eq!(response2.code, 12);
}

#[tokio::test]
async fn scenario_6_concurrent_sessions_do_not_cross_talk() {
    let temp_dir = TempDir::new().unwrap();
    let upstream_path = temp_dir.path().join("upstream.sock");
    let proxy_path = temp_dir.path().join("proxy.sock");

    let key_a = key_blob(ED25519_KEY_WORK);
    let group = own_primary_group();
    let (md5, sha256) = both_fingerprints(&key_a);
    let mut policy: Policy = HashMap::new();
    let mut authorized = HashSet::new();
    authorized.insert(group);
    policy.insert(md5, authorized);
    policy.insert(sha256, HashSet::new()); // sha256 entry deliberately unauthorized

    start_mock_agent(&upstream_path).await;
    let upstream = Upstream::new(&upstream_path);
    let proxy = Arc::new(Proxy::new(upstream, Arc::new(policy)));
    start_proxy(&proxy_path, proxy).await;

    let mut authorized_client = UnixStream::connect(&proxy_path).await.unwrap();
    let mut unauthorized_client = UnixStream::connect(&proxy_path).await.unwrap();

    let key_b = key_blob(ED25519_KEY_PERSONAL);

    let (mut ar, mut aw) = authorized_client.split();
    let (mut ur, mut uw) = unauthorized_client.split();

    write_message(&mut aw, &AgentMessage::new(13, sign_body(&key_a)))
        .await
        .unwrap();
    write_message(&mut uw, &AgentMessage::new(13, sign_body(&key_b)))
        .await
        .unwrap();

    let authorized_response = read_message(&mut ar).await.unwrap().unwrap();
    let unauthorized_response = read_message(&mut ur).await.unwrap().unwrap();

    assert_eq!(authorized_response.code, 14);
    assert_eq!(unauthorized_response.code, 5);
}
