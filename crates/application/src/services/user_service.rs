use std::sync::Arc;

use domain::{Password, RepositoryError, SecretVerifier, User, UserId, UserToken, Username};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::{
    credential::CredentialService,
    error::ApplicationError,
    repository::UserRepository,
    secret::{hash_secret, verify_secret},
};

#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

/// 登录与重新激活共用的凭据
#[derive(Debug, Clone)]
pub struct SigninRequest {
    pub username: String,
    pub password: String,
}

/// 登录成功后返回给客户端的会话信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: UserId,
    pub username: Username,
    pub token: String,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub credentials: Arc<dyn CredentialService>,
    pub secret_verifier: Arc<dyn SecretVerifier>,
}

/// 用户名不存在时参与比较的摘要明文
const DUMMY_SECRET: &str = "chatroom-signin-placeholder";

pub struct UserService {
    deps: UserServiceDependencies,
    dummy_digest: OnceCell<String>,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self {
            deps,
            dummy_digest: OnceCell::new(),
        }
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<AuthSession, ApplicationError> {
        let username = Username::parse(request.username)?;
        let password = Password::parse(request.password)?;

        let digest = hash_secret(
            Arc::clone(&self.deps.secret_verifier),
            password.as_str().to_owned(),
        )
        .await?;

        let user = User::new(UserId::generate(), username.clone(), digest);
        let token = self.deps.credentials.issue(user.user_id)?;

        self.deps
            .user_repository
            .create(user.clone(), Some(UserToken::new(token.clone())))
            .await?;

        info!(user_id = %user.user_id, username = %username, "user signed up");
        Ok(AuthSession {
            user_id: user.user_id,
            username,
            token,
        })
    }

    /// 用户名不存在和密码错误返回同一个错误
    pub async fn signin(&self, request: SigninRequest) -> Result<AuthSession, ApplicationError> {
        let Ok(username) = Username::parse(request.username) else {
            return self.reject_unknown_user(request.password).await;
        };

        let user = match self.deps.user_repository.find_by_username(&username).await {
            Ok(user) => user,
            Err(err) if err.is_not_found() => {
                return self.reject_unknown_user(request.password).await
            }
            Err(err) => return Err(err.into()),
        };

        self.check_password(&user, request.password).await?;
        self.open_session(user).await
    }

    pub async fn signout(&self, user_id: UserId) -> Result<(), ApplicationError> {
        let user = self.deps.user_repository.find_by_id(user_id).await?;
        self.deps.user_repository.clear_token(user_id).await?;
        self.deps
            .user_repository
            .set_online(&user.user_name, false)
            .await?;
        info!(user_id = %user_id, "user signed out");
        Ok(())
    }

    pub async fn deactivate(&self, user_id: UserId) -> Result<(), ApplicationError> {
        self.deps.user_repository.deactivate(user_id).await?;
        info!(user_id = %user_id, "user deactivated");
        Ok(())
    }

    /// 已停用的用户凭用户名和密码恢复账户，并开启新的会话
    pub async fn reactivate(&self, request: SigninRequest) -> Result<AuthSession, ApplicationError> {
        let username =
            Username::parse(request.username).map_err(|_| ApplicationError::Authentication)?;

        let user = match self
            .deps
            .user_repository
            .find_deactivated_by_username(&username)
            .await
        {
            Ok(user) => user,
            Err(err) if err.is_not_found() => return Err(ApplicationError::Authentication),
            Err(err) => return Err(err.into()),
        };

        self.check_password(&user, request.password).await?;
        let user = self.deps.user_repository.reactivate(user.user_id).await?;
        info!(user_id = %user.user_id, "user reactivated");
        self.open_session(user).await
    }

    pub async fn find_user(&self, user_id: UserId) -> Result<User, ApplicationError> {
        Ok(self.deps.user_repository.find_by_id(user_id).await?)
    }

    /// 校验请求携带的令牌：签名、主体、与存储的当前令牌一致、未过期
    pub async fn authenticate_token(&self, token: &str) -> Result<UserId, ApplicationError> {
        let credentials = &self.deps.credentials;
        credentials
            .validate(token)
            .map_err(|_| ApplicationError::Authentication)?;

        let subject = credentials
            .subject_of(token)
            .map_err(|_| ApplicationError::Authentication)?;
        let user_id =
            UserId::parse_str(&subject).map_err(|_| ApplicationError::Authentication)?;

        let stored = match self.deps.user_repository.find_token(user_id).await {
            Ok(stored) => stored,
            Err(RepositoryError::RecordNotFound { .. }) => {
                return Err(ApplicationError::Authentication)
            }
            Err(err) => return Err(err.into()),
        };
        if stored.token != token {
            return Err(ApplicationError::Authentication);
        }

        if credentials.is_expired(token) {
            return Err(ApplicationError::Authentication);
        }

        Ok(user_id)
    }

    async fn check_password(&self, user: &User, password: String) -> Result<(), ApplicationError> {
        verify_secret(
            Arc::clone(&self.deps.secret_verifier),
            user.hashed_password.clone(),
            password,
        )
        .await
        .map_err(|err| {
            warn!(user_id = %user.user_id, error = %err, "password check failed");
            ApplicationError::Authentication
        })
    }

    /// 用户名不存在时同样做一次完整的摘要比较，响应耗时与密码错误一致
    async fn reject_unknown_user<T>(&self, password: String) -> Result<T, ApplicationError> {
        let digest = self
            .dummy_digest
            .get_or_try_init(|| {
                hash_secret(
                    Arc::clone(&self.deps.secret_verifier),
                    DUMMY_SECRET.to_owned(),
                )
            })
            .await?;
        let _ = verify_secret(
            Arc::clone(&self.deps.secret_verifier),
            digest.clone(),
            password,
        )
        .await;
        Err(ApplicationError::Authentication)
    }

    /// 签发新令牌并覆盖旧令牌，同一用户只保留一个有效会话
    async fn open_session(&self, user: User) -> Result<AuthSession, ApplicationError> {
        let token = self.deps.credentials.issue(user.user_id)?;
        self.deps
            .user_repository
            .save_token(user.user_id, UserToken::new(token.clone()))
            .await?;
        self.deps
            .user_repository
            .set_online(&user.user_name, true)
            .await?;

        info!(user_id = %user.user_id, "user signed in");
        Ok(AuthSession {
            user_id: user.user_id,
            username: user.user_name,
            token,
        })
    }
}
