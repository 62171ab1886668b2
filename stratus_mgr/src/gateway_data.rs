// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

use stratus_api::common::{COMPONENT_EVENT_BUS, CONSUMER_MGR, EVENT_APIGATEWAY_DATA_FETCH};
use stratus_api::component::{GatewayData, ManagerComponent};
use stratus_api::persistence::PersistenceError;
use stratus_api::resource::Resource;
use stratus_messenger::{IncomingEvent, Messenger, MessengerError};

use crate::store::Store;

/// Components whose coordinates are handed to the gateway.
const GATEWAY_COMPONENTS: [&str; 1] = [COMPONENT_EVENT_BUS];

/// Collect the configuration of the API gateway.
pub async fn gateway_data(store: &Store) -> Result<GatewayData, PersistenceError> {
    let manager_components = store
        .get_all::<ManagerComponent>()
        .await?
        .into_iter()
        .filter(|c| GATEWAY_COMPONENTS.contains(&c.id.as_str()))
        .collect();
    Ok(GatewayData {
        manager_components,
        resources: store.get_all::<Resource>().await?,
    })
}

/// Answer the configuration fetches of the gateway.
pub async fn listen(messenger: &Messenger, store: Store) -> Result<(), MessengerError> {
    messenger
        .subscribe(
            EVENT_APIGATEWAY_DATA_FETCH,
            CONSUMER_MGR,
            std::sync::Arc::new(move |event: IncomingEvent| {
                let store = store.clone();
                async move {
                    let request_id = event.request_id().to_string();
                    let res = match gateway_data(&store).await {
                        Ok(data) => match serde_json::to_value(data) {
                            Ok(payload) => event.reply_success(200, payload).await,
                            Err(err) => event.reply_error(500, &err.to_string()).await,
                        },
                        Err(err) => {
                            log::error!("could not collect the gateway data: {}", err);
                            event.reply_error(500, &err.to_string()).await
                        }
                    };
                    if let Err(err) = res {
                        log::warn!("could not reply to gateway data fetch {}: {}", request_id, err);
                    }
                }
            }),
        )
        .await?;
    log::info!("listening for gateway data fetches on {}", EVENT_APIGATEWAY_DATA_FETCH);
    Ok(())
}
