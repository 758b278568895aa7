//! Engine values rendered as wire types.

use api_types::{
    card::CardView,
    payment::{PartyView, TokenStatus as WireStatus, TokenView},
    user::AccountView,
    wallet::WalletView,
};
use engine::{Account, Card, Party, TokenStatus, TransferToken, Wallet};

pub(crate) fn account(account: &Account) -> AccountView {
    AccountView {
        id: account.id,
        email: account.email.clone(),
        fullname: account.display_name.clone(),
        created_at: account.created_at,
    }
}

pub(crate) fn wallet(wallet: &Wallet) -> WalletView {
    WalletView {
        balance: wallet.balance.to_string(),
        updated_at: wallet.updated_at,
    }
}

pub(crate) fn card(card: Card) -> CardView {
    CardView {
        id: card.id,
        card_no: card.masked_number,
        expiry_month: card.expiry_month,
        expiry_year: card.expiry_year,
        created_at: card.created_at,
    }
}

fn party(party: Party) -> PartyView {
    PartyView {
        id: party.id,
        email: party.email,
        fullname: party.display_name,
    }
}

fn status(status: TokenStatus) -> WireStatus {
    match status {
        TokenStatus::Open => WireStatus::Open,
        TokenStatus::Bound => WireStatus::Bound,
        TokenStatus::Redeemed => WireStatus::Redeemed,
    }
}

pub(crate) fn token(token: TransferToken) -> TokenView {
    TokenView {
        token: token.token,
        status: status(token.status),
        amount: token.amount.map(|amount| amount.to_string()),
        sender: party(token.sender),
        receiver: token.receiver.map(party),
        created_at: token.created_at,
        redeemed_at: token.redeemed_at,
    }
}
