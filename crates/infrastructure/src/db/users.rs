use domain::{
    online_flag_from_bytes, online_flag_to_bytes, RepositoryError, RepositoryResult, User,
    UserId, UserToken, Username,
};
use tracing::debug;

use super::{decode, decode_text, encode, ChatDatabase};
use crate::storage::{KvRead, Partition};

fn load_user(tx: &impl KvRead, partition: Partition, id: &str) -> RepositoryResult<User> {
    decode(&tx.require(partition, id)?)
}

impl ChatDatabase {
    /// 注册：用户记录、用户名索引、在线标志与可选令牌在同一事务中写入
    pub fn signup(&self, user: &User, token: Option<&UserToken>) -> RepositoryResult<()> {
        let user_id = user.user_id.to_string();
        let username = user.user_name.as_str();

        self.store.update(|tx| {
            if tx.contains(Partition::UserNames, username.as_bytes())? {
                return Err(RepositoryError::duplicate_key(
                    username,
                    Partition::UserNames.name(),
                ));
            }
            if tx.contains(Partition::Users, user_id.as_bytes())? {
                return Err(RepositoryError::duplicate_key(
                    user_id.as_str(),
                    Partition::Users.name(),
                ));
            }

            tx.put(Partition::Users, user_id.as_bytes(), &encode(user)?)?;
            tx.put(Partition::UserNames, username.as_bytes(), user_id.as_bytes())?;
            tx.put(
                Partition::UsersOnline,
                username.as_bytes(),
                &online_flag_to_bytes(true),
            )?;
            if let Some(token) = token {
                tx.put(Partition::UserTokens, user_id.as_bytes(), &encode(token)?)?;
            }
            Ok(())
        })?;

        debug!(user_id = %user_id, username, "user record created");
        Ok(())
    }

    pub fn user_by_id(&self, id: &UserId) -> RepositoryResult<User> {
        let id = id.to_string();
        self.store.view(|tx| load_user(tx, Partition::Users, &id))
    }

    pub fn user_by_username(&self, username: &Username) -> RepositoryResult<User> {
        self.store.view(|tx| {
            let id = decode_text(&tx.require(Partition::UserNames, username.as_str())?)?;
            match tx.get(Partition::Users, id.as_bytes())? {
                Some(bytes) => decode(&bytes),
                None => Err(RepositoryError::record_not_found(
                    username.as_str(),
                    Partition::Users.name(),
                )),
            }
        })
    }

    /// 已停用用户没有用户名索引，只能顺序查找
    pub fn deactivated_user_by_username(&self, username: &Username) -> RepositoryResult<User> {
        self.store.view(|tx| {
            for (_, value) in tx.scan_prefix(Partition::DeactivatedUsers, b"")? {
                let user: User = decode(&value)?;
                if user.user_name == *username {
                    return Ok(user);
                }
            }
            Err(RepositoryError::record_not_found(
                username.as_str(),
                Partition::DeactivatedUsers.name(),
            ))
        })
    }

    /// 把用户移到 DeactivatedUsers，删除用户名索引与令牌，并标记离线
    pub fn deactivate_user(&self, id: &UserId) -> RepositoryResult<()> {
        let id = id.to_string();
        self.store.update(|tx| {
            let data = tx.require(Partition::Users, &id)?;
            let user: User = decode(&data)?;
            let username = user.user_name.as_str();

            tx.put(Partition::DeactivatedUsers, id.as_bytes(), &data)?;
            tx.delete(Partition::UserNames, username.as_bytes())?;
            tx.delete(Partition::Users, id.as_bytes())?;
            tx.delete(Partition::UserTokens, id.as_bytes())?;
            tx.put(
                Partition::UsersOnline,
                username.as_bytes(),
                &online_flag_to_bytes(false),
            )?;
            Ok(())
        })?;
        debug!(user_id = %id, "user moved to deactivated partition");
        Ok(())
    }

    /// 恢复用户记录与用户名索引；用户名期间被他人占用时失败
    pub fn reactivate_user(&self, id: &UserId) -> RepositoryResult<User> {
        let id = id.to_string();
        let user = self.store.update(|tx| {
            let data = tx.require(Partition::DeactivatedUsers, &id)?;
            let user: User = decode(&data)?;
            let username = user.user_name.as_str();

            if tx.contains(Partition::UserNames, username.as_bytes())? {
                return Err(RepositoryError::duplicate_key(
                    username,
                    Partition::UserNames.name(),
                ));
            }

            tx.put(Partition::Users, id.as_bytes(), &data)?;
            tx.put(Partition::UserNames, username.as_bytes(), id.as_bytes())?;
            tx.delete(Partition::DeactivatedUsers, id.as_bytes())?;
            Ok(user)
        })?;
        debug!(user_id = %id, "user reactivated");
        Ok(user)
    }

    pub fn set_online(&self, username: &Username, online: bool) -> RepositoryResult<()> {
        self.store.update(|tx| {
            tx.put(
                Partition::UsersOnline,
                username.as_str().as_bytes(),
                &online_flag_to_bytes(online),
            )
        })
    }

    pub fn is_online(&self, username: &Username) -> RepositoryResult<bool> {
        self.store.view(|tx| {
            let flag = tx.require(Partition::UsersOnline, username.as_str())?;
            Ok(online_flag_from_bytes(&flag))
        })
    }

    /// 覆盖该用户之前的令牌
    pub fn save_token(&self, id: &UserId, token: &UserToken) -> RepositoryResult<()> {
        let id = id.to_string();
        let data = encode(token)?;
        self.store
            .update(|tx| tx.put(Partition::UserTokens, id.as_bytes(), &data))
    }

    pub fn user_token(&self, id: &UserId) -> RepositoryResult<UserToken> {
        let id = id.to_string();
        self.store
            .view(|tx| decode(&tx.require(Partition::UserTokens, &id)?))
    }

    pub fn clear_token(&self, id: &UserId) -> RepositoryResult<()> {
        let id = id.to_string();
        self.store.update(|tx| {
            tx.delete(Partition::UserTokens, id.as_bytes())?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use domain::{RepositoryError, User, UserId, UserToken, Username};

    use crate::db::test_support::{database, signup};
    use crate::storage::{KvRead, Partition};

    #[test]
    fn signup_writes_every_index() {
        let db = database();
        let user = User::new(
            UserId::generate(),
            Username::parse("alice").unwrap(),
            "hashed:password123",
        );
        db.signup(&user, Some(&UserToken::new("t1"))).unwrap();

        assert_eq!(db.user_by_id(&user.user_id).unwrap(), user);
        assert_eq!(db.user_by_username(&user.user_name).unwrap(), user);
        assert!(db.is_online(&user.user_name).unwrap());
        assert_eq!(db.user_token(&user.user_id).unwrap().token, "t1");
    }

    #[test]
    fn duplicate_username_is_rejected_without_side_effects() {
        let db = database();
        let alice = signup(&db, "alice");

        let impostor = User::new(UserId::generate(), alice.user_name.clone(), "hashed:other");
        let err = db
            .signup(&impostor, Some(&UserToken::new("t2")))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateKey { .. }));

        assert!(db.user_by_id(&impostor.user_id).unwrap_err().is_not_found());
        assert!(db.user_token(&impostor.user_id).unwrap_err().is_not_found());
        assert_eq!(db.user_by_username(&alice.user_name).unwrap(), alice);
    }

    #[test]
    fn deactivate_and_reactivate_cycle() {
        let db = database();
        let alice = signup(&db, "alice");
        db.save_token(&alice.user_id, &UserToken::new("t1")).unwrap();

        db.deactivate_user(&alice.user_id).unwrap();
        assert!(db.user_by_id(&alice.user_id).unwrap_err().is_not_found());
        assert!(db.user_by_username(&alice.user_name).unwrap_err().is_not_found());
        assert!(db.user_token(&alice.user_id).unwrap_err().is_not_found());
        assert!(!db.is_online(&alice.user_name).unwrap());
        assert_eq!(
            db.deactivated_user_by_username(&alice.user_name).unwrap(),
            alice
        );

        // 再次停用：活跃分区中已没有该用户
        assert!(db.deactivate_user(&alice.user_id).unwrap_err().is_not_found());

        let restored = db.reactivate_user(&alice.user_id).unwrap();
        assert_eq!(restored, alice);
        assert_eq!(db.user_by_username(&alice.user_name).unwrap(), alice);
        assert!(db.reactivate_user(&alice.user_id).unwrap_err().is_not_found());

        db.store()
            .view(|tx| {
                assert!(!tx.contains(Partition::DeactivatedUsers, alice.user_id.to_string().as_bytes())?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn reactivation_fails_when_username_was_taken() {
        let db = database();
        let alice = signup(&db, "alice");
        db.deactivate_user(&alice.user_id).unwrap();

        let newcomer = signup(&db, "alice");
        let err = db.reactivate_user(&alice.user_id).unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateKey { .. }));

        assert_eq!(db.user_by_username(&alice.user_name).unwrap(), newcomer);
        assert!(db.deactivated_user_by_username(&alice.user_name).is_ok());
    }

    #[test]
    fn token_is_overwritten_and_cleared() {
        let db = database();
        let alice = signup(&db, "alice");

        db.save_token(&alice.user_id, &UserToken::new("first")).unwrap();
        db.save_token(&alice.user_id, &UserToken::new("second")).unwrap();
        assert_eq!(db.user_token(&alice.user_id).unwrap().token, "second");

        db.clear_token(&alice.user_id).unwrap();
        assert!(db.user_token(&alice.user_id).unwrap_err().is_not_found());
    }

    #[test]
    fn online_flag_toggles() {
        let db = database();
        let alice = signup(&db, "alice");
        db.set_online(&alice.user_name, false).unwrap();
        assert!(!db.is_online(&alice.user_name).unwrap());
        db.set_online(&alice.user_name, true).unwrap();
        assert!(db.is_online(&alice.user_name).unwrap());
    }
}
