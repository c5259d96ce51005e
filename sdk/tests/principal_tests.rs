//! Principal identity, addresses and signatures.

use use_delegation_sdk::{Instruction, Operation, Principal, PrincipalId, RegistryError};

mod identity {
    use super::*;

    #[test]
    fn address_round_trips_to_id() {
        let p = Principal::generate();
        let addr = p.id().to_string();
        assert!(addr.starts_with("kaspatest:"));
        assert_eq!(addr.parse::<PrincipalId>().unwrap(), p.id());
    }

    #[test]
    fn hex_public_key_parses() {
        let p = Principal::generate();
        let hex_pk = hex::encode(p.id().as_bytes());
        assert_eq!(hex_pk.parse::<PrincipalId>().unwrap(), p.id());
    }

    #[test]
    fn secret_reload_keeps_identity() {
        let p = Principal::generate();
        let reloaded = Principal::from_secret_hex(&p.secret_hex()).unwrap();
        assert_eq!(reloaded.id(), p.id());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!("kaspatest:nope".parse::<PrincipalId>().is_err());
        assert!("abcd".parse::<PrincipalId>().is_err());
        assert!(Principal::from_secret_hex("zz").is_err());
    }

    #[test]
    fn serializes_as_address_string() {
        let p = Principal::generate();
        let json = serde_json::to_string(&p.id()).unwrap();
        assert_eq!(json, format!("\"{}\"", p.id()));
        let back: PrincipalId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p.id());
    }
}

mod signing {
    use super::*;

    #[test]
    fn signature_verifies_only_for_signer() {
        let p = Principal::generate();
        let other = Principal::generate();
        let digest = [7u8; 32];
        let sig = p.sign_digest(digest);
        assert!(p.id().verify(digest, &sig));
        assert!(!other.id().verify(digest, &sig));
        assert!(!p.id().verify([8u8; 32], &sig));
    }

    #[test]
    fn signed_operation_verifies() {
        let p = Principal::generate();
        let tx = Operation::new(
            p.id(),
            Instruction::Transfer {
                recipient: Principal::generate().id(),
                amount: 10,
            },
        )
        .sign(&p);
        assert!(tx.verify().is_ok());
    }

    #[test]
    fn tampered_operation_fails_verification() {
        let p = Principal::generate();
        let mut tx = Operation::new(
            p.id(),
            Instruction::Transfer {
                recipient: Principal::generate().id(),
                amount: 10,
            },
        )
        .sign(&p);
        tx.operation.instruction = Instruction::Transfer {
            recipient: Principal::generate().id(),
            amount: 1_000,
        };
        assert!(matches!(
            tx.verify(),
            Err(RegistryError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn signer_must_be_fee_payer() {
        let payer = Principal::generate();
        let impostor = Principal::generate();
        let tx = Operation::new(
            payer.id(),
            Instruction::Transfer {
                recipient: impostor.id(),
                amount: 1,
            },
        )
        .sign(&impostor);
        assert!(matches!(
            tx.verify(),
            Err(RegistryError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn signed_operation_survives_json() {
        let p = Principal::generate();
        let tx = Operation::new(
            p.id(),
            Instruction::Utilize {
                capability: use_delegation_sdk::CapabilityId::derive(&p.id(), &uuid::Uuid::new_v4()),
                number_of_uses: 1,
            },
        )
        .sign(&p);
        let json = serde_json::to_string(&tx).unwrap();
        let back: use_delegation_sdk::SignedOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
        assert!(back.verify().is_ok());
    }

    #[test]
    fn expiry_is_part_of_the_signed_digest() {
        let p = Principal::generate();
        let op = Operation::new(
            p.id(),
            Instruction::Transfer {
                recipient: Principal::generate().id(),
                amount: 1,
            },
        );
        let json = serde_json::to_value(&op).unwrap();
        assert!(json.get("expires_at").is_none());
        assert_ne!(op.digest(), op.clone().valid_until(10).digest());
        assert_eq!(op.digest(), op.clone().digest());

        let mut tx = op.valid_until(10).sign(&p);
        assert!(tx.verify().is_ok());
        tx.operation.expires_at = Some(1_000);
        assert!(matches!(
            tx.verify(),
            Err(RegistryError::InvalidSignature { .. })
        ));
    }
}
