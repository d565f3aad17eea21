#[cfg(test)]
mod integration_tests {
    use polyratchet::megolm::{
        ExportedSessionKey, GroupSession, InboundGroupSession, MegolmMessage, SessionKey,
        SessionOrdering,
    };
    use polyratchet::sas::{Mac, Sas};
    use polyratchet::{
        Account, AccountConfig, Curve25519PublicKey, Error, OlmMessage, OverflowPolicy,
        PickleFormat, PreKeyMessage, Session, SessionConfig,
    };

    const PICKLE_KEY: [u8; 32] = *b"a 32 byte pickle key for testing";

    fn pre_key(message: OlmMessage) -> PreKeyMessage {
        match message {
            OlmMessage::PreKey(message) => Some(message),
            OlmMessage::Normal(_) => None,
        }
        .unwrap()
    }

    fn first_one_time_key(account: &Account) -> Curve25519PublicKey {
        *account.one_time_keys().values().next().unwrap()
    }

    #[test]
    fn test_hello_there() {
        println!("Step 1: Creating accounts for Alice and Bob...");
        let alice = Account::new();
        let mut bob = Account::new();
        bob.generate_one_time_keys(1).unwrap();
        let one_time_key = first_one_time_key(&bob);
        bob.mark_keys_as_published();

        println!("Step 2: Alice starts a session and encrypts...");
        let mut alice_session = alice
            .create_outbound_session(SessionConfig::version_1(), bob.curve25519_key(), one_time_key)
            .unwrap();
        let (message_type, body) = alice_session.encrypt("Hello there").to_parts();
        assert_eq!(message_type, 0);

        println!("Step 3: Bob creates the inbound session from the wire form...");
        let message = pre_key(OlmMessage::from_parts(message_type, &body).unwrap());
        let result = bob
            .create_inbound_session(alice.curve25519_key(), &message)
            .unwrap();
        assert_eq!(result.plaintext, b"Hello there");
        let mut bob_session = result.session;
        assert_eq!(bob_session.session_id(), alice_session.session_id());

        println!("Step 4: An unrelated ciphertext fails to authenticate...");
        let carol = Account::new();
        let mut dave = Account::new();
        dave.generate_one_time_keys(1).unwrap();
        let mut unrelated = carol
            .create_outbound_session(
                SessionConfig::version_1(),
                dave.curve25519_key(),
                first_one_time_key(&dave),
            )
            .unwrap();
        let (message_type, body) = unrelated.encrypt("Not for Bob").to_parts();
        let unrelated = OlmMessage::from_parts(message_type, &body).unwrap();

        assert!(!bob_session.session_matches(&unrelated));
        assert!(matches!(
            bob_session.decrypt(&unrelated),
            Err(Error::AuthenticationFailed(_))
        ));

        println!("Step 5: The session still works afterwards...");
        let reply = bob_session.encrypt("General Kenobi");
        assert_eq!(alice_session.decrypt(&reply).unwrap(), b"General Kenobi");
    }

    #[test]
    fn test_one_time_key_is_consumed() {
        let alice = Account::new();
        let mut bob = Account::new();
        bob.generate_one_time_keys(2).unwrap();
        let one_time_key = first_one_time_key(&bob);

        let mut session = alice
            .create_outbound_session(SessionConfig::version_2(), bob.curve25519_key(), one_time_key)
            .unwrap();
        let message = pre_key(session.encrypt("once"));

        bob.create_inbound_session(alice.curve25519_key(), &message)
            .unwrap();
        assert_eq!(bob.stored_one_time_key_count(), 1);
        assert!(!bob.one_time_keys().values().any(|key| *key == one_time_key));

        assert!(matches!(
            bob.create_inbound_session(alice.curve25519_key(), &message),
            Err(Error::KeyExhausted(_))
        ));
    }

    #[test]
    fn test_fallback_key_session() {
        let alice = Account::new();
        let mut bob = Account::new();
        bob.generate_fallback_key();
        let fallback_key = *bob.fallback_key().values().next().unwrap();
        bob.mark_keys_as_published();
        assert!(bob.fallback_key().is_empty());

        let mut alice_session = alice
            .create_outbound_session(SessionConfig::version_2(), bob.curve25519_key(), fallback_key)
            .unwrap();
        let message = pre_key(alice_session.encrypt("via fallback"));

        let mut bob_session = bob
            .create_inbound_session(alice.curve25519_key(), &message)
            .unwrap()
            .session;

        println!("Rotating the fallback key keeps the previous one usable...");
        bob.generate_fallback_key();
        let second = pre_key(alice_session.encrypt("still pre-key"));
        assert_eq!(bob_session.decrypt(&OlmMessage::from(second)).unwrap(), b"still pre-key");

        let mut late = alice
            .create_outbound_session(SessionConfig::version_2(), bob.curve25519_key(), fallback_key)
            .unwrap();
        assert!(
            bob.create_inbound_session(alice.curve25519_key(), &pre_key(late.encrypt("late")))
                .is_ok()
        );

        bob.forget_fallback_key();
        let mut too_late = alice
            .create_outbound_session(SessionConfig::version_2(), bob.curve25519_key(), fallback_key)
            .unwrap();
        assert!(matches!(
            bob.create_inbound_session(alice.curve25519_key(), &pre_key(too_late.encrypt("x"))),
            Err(Error::KeyExhausted(_))
        ));
    }

    #[test]
    fn test_long_conversation_out_of_order() {
        let alice = Account::new();
        let mut bob = Account::new();
        bob.generate_one_time_keys(1).unwrap();

        let mut alice_session = alice
            .create_outbound_session(
                SessionConfig::version_1(),
                bob.curve25519_key(),
                first_one_time_key(&bob),
            )
            .unwrap();
        let mut bob_session = bob
            .create_inbound_session(
                alice.curve25519_key(),
                &pre_key(alice_session.encrypt("start")),
            )
            .unwrap()
            .session;

        for round in 0..10 {
            let messages: Vec<_> = (0..5)
                .map(|i| (format!("bob {round}:{i}"), bob_session.encrypt(format!("bob {round}:{i}"))))
                .collect();
            for (plaintext, message) in messages.iter().rev() {
                assert_eq!(alice_session.decrypt(message).unwrap(), plaintext.as_bytes());
            }

            let message = alice_session.encrypt(format!("alice {round}"));
            assert!(matches!(message, OlmMessage::Normal(_)));
            assert_eq!(
                bob_session.decrypt(&message).unwrap(),
                format!("alice {round}").as_bytes()
            );
        }
    }

    #[test]
    fn test_account_and_session_pickles() {
        println!("Pickling an account with keys in every state...");
        let mut account = Account::with_config(AccountConfig {
            overflow_policy: OverflowPolicy::Reject,
            ..AccountConfig::default()
        });
        account.generate_one_time_keys(5).unwrap();
        account.generate_fallback_key();

        let pickle = account.pickle(&PICKLE_KEY).unwrap();
        let mut restored = Account::from_pickle(&pickle, &PICKLE_KEY, PickleFormat::Current).unwrap();
        assert_eq!(restored.identity_keys(), account.identity_keys());
        assert_eq!(restored.one_time_keys(), account.one_time_keys());
        assert_eq!(restored.fallback_key(), account.fallback_key());
        assert_eq!(restored.config().overflow_policy, OverflowPolicy::Reject);

        println!("A restored account still accepts sessions on its keys...");
        let alice = Account::new();
        let mut session = alice
            .create_outbound_session(
                SessionConfig::version_1(),
                restored.curve25519_key(),
                first_one_time_key(&restored),
            )
            .unwrap();
        let inbound = restored
            .create_inbound_session(alice.curve25519_key(), &pre_key(session.encrypt("hi")))
            .unwrap();

        println!("Sessions survive a pickle round-trip...");
        let mut session =
            Session::from_pickle(&session.pickle(&PICKLE_KEY).unwrap(), &PICKLE_KEY, PickleFormat::Current)
                .unwrap();
        let mut inbound = Session::from_pickle(
            &inbound.session.pickle(&PICKLE_KEY).unwrap(),
            &PICKLE_KEY,
            PickleFormat::Current,
        )
        .unwrap();
        assert_eq!(session.decrypt(&inbound.encrypt("reply")).unwrap(), b"reply");

        assert_eq!(
            Session::from_pickle(&pickle, &PICKLE_KEY[..31], PickleFormat::Current).map(|_| ()),
            Err(Error::InvalidKeyLength {
                expected: 32,
                actual: 31
            })
        );
        assert!(matches!(
            Account::from_pickle(&pickle, &[0u8; 32], PickleFormat::Current),
            Err(Error::AuthenticationFailed(_))
        ));
        assert!(Account::from_pickle(&pickle, &PICKLE_KEY, PickleFormat::Legacy).is_err());
    }

    #[test]
    fn test_group_session_any_order() {
        let mut outbound = GroupSession::new(SessionConfig::version_1());
        let session_key = SessionKey::from_base64(&outbound.session_key().to_base64()).unwrap();
        let mut inbound = InboundGroupSession::new(&session_key, SessionConfig::version_1());
        assert_eq!(inbound.session_id(), outbound.session_id());

        let messages: Vec<String> = (0..20)
            .map(|i| outbound.encrypt(format!("message {i}")).to_base64())
            .collect();

        for index in [7usize, 19, 0, 3, 18, 7, 1, 12] {
            let message = MegolmMessage::from_base64(&messages[index]).unwrap();
            let decrypted = inbound.decrypt(&message).unwrap();
            assert_eq!(decrypted.message_index as usize, index);
            assert_eq!(decrypted.plaintext, format!("message {index}").as_bytes());
        }
    }

    #[test]
    fn test_group_export_refuses_history() {
        let mut outbound = GroupSession::new(SessionConfig::version_2());
        let mut inbound = InboundGroupSession::new(&outbound.session_key(), SessionConfig::version_2());
        let messages: Vec<_> = (0..10).map(|i| outbound.encrypt(format!("{i}"))).collect();

        let export = inbound.export_at(5).unwrap();
        let export = ExportedSessionKey::from_base64(&export.to_base64()).unwrap();
        let mut imported = InboundGroupSession::import(&export, SessionConfig::version_2());

        assert_eq!(imported.first_known_index(), 5);
        assert!(!imported.signing_key_verified());
        for message in &messages[..5] {
            assert!(matches!(
                imported.decrypt(message),
                Err(Error::ProtocolViolation(_))
            ));
        }
        for message in &messages[5..] {
            assert_eq!(
                imported.decrypt(message).unwrap().plaintext,
                inbound.decrypt(message).unwrap().plaintext
            );
        }

        assert!(matches!(imported.export_at(4), Err(Error::KeyExhausted(_))));
        assert_eq!(inbound.compare(&imported), SessionOrdering::Better);
        let merged = imported.merge(&inbound).unwrap();
        assert_eq!(merged.first_known_index(), 0);
        assert!(merged.signing_key_verified());
    }

    #[test]
    fn test_sas_verification() {
        println!("Both devices exchange ephemeral keys...");
        let alice = Sas::new();
        let bob = Sas::new();
        let alice_public = alice.public_key().to_base64();
        let bob_public = bob.public_key().to_base64();

        let alice = alice.diffie_hellman_with_raw(&bob_public).unwrap();
        let bob = bob.diffie_hellman_with_raw(&alice_public).unwrap();

        println!("The short strings match on both sides...");
        let info = "MATRIX_KEY_VERIFICATION_SAS|@alice:example.org|ALICE|@bob:example.org|BOB";
        assert_eq!(alice.bytes(info).emoji_indices(), bob.bytes(info).emoji_indices());
        assert_eq!(alice.bytes(info).decimals(), bob.bytes(info).decimals());

        println!("MACs verify, and any flipped bit is caught...");
        let mac_info = "MATRIX_KEY_VERIFICATION_MACKEY_IDS";
        let mac = alice.calculate_mac("ed25519:ALICE", mac_info).to_base64();
        let mac = Mac::from_base64(&mac).unwrap();
        assert!(bob.verify_mac("ed25519:ALICE", mac_info, &mac));

        let mut bytes = *mac.as_bytes();
        bytes[31] ^= 0x80;
        assert!(!bob.verify_mac("ed25519:ALICE", mac_info, &Mac::from_slice(&bytes).unwrap()));
    }
}
